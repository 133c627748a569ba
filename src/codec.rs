//! Conversion between wire values and storage values.
//!
//! Writes: a JSON value is checked against the field's wire type and turned
//! into a bound `sea_query` value, cast to the column type where the driver
//! cannot bind it natively (PostgreSQL network, enum, custom and array types).
//!
//! Reads: each column is projected so the driver can decode it (text for
//! vendor types, `to_jsonb` for PostgreSQL arrays) and converted back to JSON.

use crate::descriptor::ColumnDescriptor;
use crate::schema::ApiField;
use crate::types::{TypeCategory, WireType};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{DbBackend, DbErr, QueryResult, TryGetable, Value};
use serde_json::Value as Json;
use std::str::FromStr;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Validate `value` for `column` and turn it into a bindable expression.
///
/// The error is a client-facing message, without the field name.
pub(crate) fn encode(
    column: &ColumnDescriptor,
    field: &ApiField,
    value: &Json,
    backend: DbBackend,
) -> Result<SimpleExpr, String> {
    let category = &column.type_category;
    let bound = if value.is_null() {
        if !column.nullable {
            return Err("may not be null".to_string());
        }
        null_of(category, backend)
    } else {
        to_storage(category, &field.wire_type, field.max_length, value, backend)?
    };

    if backend == DbBackend::Postgres && needs_cast(category) {
        Ok(Expr::val(bound).cast_as(Alias::new(pg_type(category))))
    } else {
        Ok(SimpleExpr::Value(bound))
    }
}

/// Parse a path segment as a primary key. `None` when the text cannot
/// denote any row of this key type.
pub(crate) fn parse_key(
    column: &ColumnDescriptor,
    field: &ApiField,
    raw: &str,
    backend: DbBackend,
) -> Option<SimpleExpr> {
    let candidate = match field.wire_type {
        WireType::Integer => Json::from(raw.parse::<i64>().ok()?),
        WireType::Number => Json::from(raw.parse::<f64>().ok()?),
        WireType::Boolean => Json::Bool(raw.parse().ok()?),
        _ => Json::String(raw.to_owned()),
    };
    encode(column, field, &candidate, backend).ok()
}

/// Key assigned on create when storage has no default for it.
pub(crate) fn generated_key(column: &ColumnDescriptor) -> Option<Json> {
    (column.type_category == TypeCategory::Uuid && !column.has_default)
        .then(|| Json::String(Uuid::new_v4().to_string()))
}

/// Select expression for a column, aliased to the column name by the caller.
pub(crate) fn projection(column: &ColumnDescriptor, backend: DbBackend) -> SimpleExpr {
    let col = Expr::col(Alias::new(column.name.as_str()));
    if reads_as_text(&column.type_category, backend) {
        let text = if backend == DbBackend::MySql { "char" } else { "text" };
        col.cast_as(Alias::new(text))
    } else if backend == DbBackend::Postgres && matches!(column.type_category, TypeCategory::Array(_))
    {
        Func::cust(Alias::new("to_jsonb")).arg(col).into()
    } else {
        col.into()
    }
}

/// `RETURNING` expression for a column, named after it and decodable by [`decode`].
pub(crate) fn returning(column: &ColumnDescriptor, backend: DbBackend) -> SimpleExpr {
    if reads_as_text(&column.type_category, backend) {
        let name = column.name.replace('"', "\"\"");
        Expr::cust(format!(r#"CAST("{name}" AS text) AS "{name}""#))
    } else {
        Expr::col(Alias::new(column.name.as_str())).into()
    }
}

/// Read one projected column back into its wire representation.
pub(crate) fn decode(
    row: &QueryResult,
    column: &ColumnDescriptor,
    field: &ApiField,
    backend: DbBackend,
) -> Result<Json, DbErr> {
    use TypeCategory as C;

    let name = column.name.as_str();
    let category = &column.type_category;
    if reads_as_text(category, backend) {
        return Ok(get::<String>(row, name)?.map_or(Json::Null, |text| from_text(&field.wire_type, text)));
    }

    let value = match category {
        C::Boolean => get::<bool>(row, name)?.map(Json::Bool),
        C::TinyInteger
        | C::SmallInteger
        | C::Integer
        | C::BigInteger
        | C::TinyUnsigned
        | C::SmallUnsigned
        | C::Unsigned
        | C::BigUnsigned
        | C::Year => read_integer(row, name, category, backend)?,
        C::Float => get::<f32>(row, name)?.map(|f| number_from_text(&f.to_string())),
        C::Double => get::<f64>(row, name)?.map(Json::from),
        C::Decimal | C::Money => {
            get::<Decimal>(row, name)?.map(|d| d.to_f64().map_or(Json::Null, Json::from))
        }
        C::Char(_) | C::String(_) | C::Text => get::<String>(row, name)?.map(Json::String),
        C::Date => get::<NaiveDate>(row, name)?
            .map(|d| Json::String(d.format(DATE_FORMAT).to_string())),
        C::DateTime | C::Timestamp => get::<NaiveDateTime>(row, name)?
            .map(|dt| Json::String(dt.format(DATETIME_FORMAT).to_string())),
        C::TimestampWithTimeZone => {
            get::<DateTime<FixedOffset>>(row, name)?.map(|dt| Json::String(dt.to_rfc3339()))
        }
        C::Uuid => get::<Uuid>(row, name)?.map(|u| Json::String(u.to_string())),
        C::Binary | C::VarBinary | C::Blob => {
            get::<Vec<u8>>(row, name)?.map(|bytes| Json::String(BASE64.encode(bytes)))
        }
        C::Json | C::JsonBinary | C::Array(_) => get::<Json>(row, name)?,
        _ => get::<String>(row, name)?.map(|text| from_text(&field.wire_type, text)),
    };
    Ok(value.unwrap_or(Json::Null))
}

fn get<T: TryGetable>(row: &QueryResult, column: &str) -> Result<Option<T>, DbErr> {
    row.try_get::<Option<T>>("", column)
}

fn read_integer(
    row: &QueryResult,
    name: &str,
    category: &TypeCategory,
    backend: DbBackend,
) -> Result<Option<Json>, DbErr> {
    use TypeCategory as C;

    let value = match (backend, category) {
        (DbBackend::Sqlite, _) => get::<i64>(row, name)?,
        (DbBackend::MySql, C::TinyInteger) => get::<i8>(row, name)?.map(i64::from),
        (DbBackend::MySql, C::TinyUnsigned) => get::<u8>(row, name)?.map(i64::from),
        (DbBackend::MySql, C::SmallUnsigned) => get::<u16>(row, name)?.map(i64::from),
        (DbBackend::MySql, C::Unsigned) => get::<u32>(row, name)?.map(i64::from),
        (DbBackend::MySql, C::BigUnsigned) => return Ok(get::<u64>(row, name)?.map(Json::from)),
        (_, C::TinyInteger | C::SmallInteger | C::TinyUnsigned | C::SmallUnsigned) => {
            get::<i16>(row, name)?.map(i64::from)
        }
        (_, C::Integer | C::Unsigned | C::Year) => get::<i32>(row, name)?.map(i64::from),
        _ => get::<i64>(row, name)?,
    };
    Ok(value.map(Json::from))
}

fn reads_as_text(category: &TypeCategory, backend: DbBackend) -> bool {
    use TypeCategory as C;

    match category {
        C::Time
        | C::Interval
        | C::Bit
        | C::VarBit
        | C::Cidr
        | C::Inet
        | C::MacAddr
        | C::Enum { .. }
        | C::Custom(_)
        | C::Unknown(_) => true,
        C::Money => backend == DbBackend::Postgres,
        _ => false,
    }
}

fn needs_cast(category: &TypeCategory) -> bool {
    use TypeCategory as C;

    matches!(
        category,
        C::Time
            | C::Interval
            | C::Bit
            | C::VarBit
            | C::Cidr
            | C::Inet
            | C::MacAddr
            | C::Enum { .. }
            | C::Custom(_)
            | C::Unknown(_)
            | C::Array(_)
    )
}

/// PostgreSQL spelling of a storage type.
fn pg_type(category: &TypeCategory) -> String {
    use TypeCategory as C;

    match category {
        C::TinyInteger | C::SmallInteger | C::TinyUnsigned | C::SmallUnsigned => "smallint".into(),
        C::Integer | C::Unsigned | C::Year => "integer".into(),
        C::BigInteger | C::BigUnsigned => "bigint".into(),
        C::Decimal => "numeric".into(),
        C::Char(_) | C::String(_) | C::Text => "text".into(),
        C::DateTime | C::Timestamp => "timestamp".into(),
        C::Array(inner) => format!("{}[]", pg_type(inner)),
        other => other.storage_name(),
    }
}

fn null_of(category: &TypeCategory, backend: DbBackend) -> Value {
    use TypeCategory as C;

    match category {
        C::Boolean => Value::Bool(None),
        C::TinyInteger | C::SmallInteger | C::TinyUnsigned => Value::SmallInt(None),
        C::Integer | C::SmallUnsigned | C::Year => Value::Int(None),
        C::BigInteger | C::Unsigned | C::BigUnsigned => Value::BigInt(None),
        C::Float => Value::Float(None),
        C::Double => Value::Double(None),
        C::Decimal | C::Money => Value::Decimal(None),
        C::Date => Value::ChronoDate(None),
        C::DateTime | C::Timestamp => Value::ChronoDateTime(None),
        C::TimestampWithTimeZone => Value::ChronoDateTimeWithTimeZone(None),
        C::Uuid => Value::Uuid(None),
        C::Binary | C::VarBinary | C::Blob => Value::Bytes(None),
        C::Json | C::JsonBinary => Value::Json(None),
        C::Array(_) if backend != DbBackend::Postgres => Value::Json(None),
        _ => Value::String(None),
    }
}

fn kind_of(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn expected(what: &str, value: &Json) -> String {
    format!("expected {what}, got {}", kind_of(value))
}

fn integer(value: &Json) -> Result<i128, String> {
    match value {
        Json::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| expected("an integer", value)),
        _ => Err(expected("an integer", value)),
    }
}

fn fit<T: TryFrom<i128>>(n: i128) -> Result<T, String> {
    T::try_from(n).map_err(|_| format!("{n} is out of range"))
}

fn text<'a>(value: &'a Json, max_length: Option<u32>) -> Result<&'a str, String> {
    let s = value.as_str().ok_or_else(|| expected("a string", value))?;
    if let Some(max) = max_length {
        if s.chars().count() > max as usize {
            return Err(format!("must be at most {max} characters"));
        }
    }
    Ok(s)
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| format!("'{s}' is not a datetime (expected ISO 8601)"))
}

#[allow(clippy::cast_possible_truncation)]
fn to_storage(
    category: &TypeCategory,
    wire: &WireType,
    max_length: Option<u32>,
    value: &Json,
    backend: DbBackend,
) -> Result<Value, String> {
    use TypeCategory as C;

    let stored = match category {
        C::Boolean => Value::from(value.as_bool().ok_or_else(|| expected("a boolean", value))?),
        C::TinyInteger => Value::from(i16::from(fit::<i8>(integer(value)?)?)),
        C::SmallInteger => Value::from(fit::<i16>(integer(value)?)?),
        C::Integer | C::Year => Value::from(fit::<i32>(integer(value)?)?),
        C::BigInteger => Value::from(fit::<i64>(integer(value)?)?),
        C::TinyUnsigned => Value::from(i16::from(fit::<u8>(integer(value)?)?)),
        C::SmallUnsigned => Value::from(i32::from(fit::<u16>(integer(value)?)?)),
        C::Unsigned => Value::from(i64::from(fit::<u32>(integer(value)?)?)),
        C::BigUnsigned => {
            let n = fit::<u64>(integer(value)?)?;
            if backend == DbBackend::MySql {
                Value::from(n)
            } else {
                Value::from(fit::<i64>(i128::from(n))?)
            }
        }
        C::Float => Value::from(value.as_f64().ok_or_else(|| expected("a number", value))? as f32),
        C::Double => Value::from(value.as_f64().ok_or_else(|| expected("a number", value))?),
        C::Decimal | C::Money => {
            let Json::Number(n) = value else {
                return Err(expected("a number", value));
            };
            let decimal = Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map_err(|_| format!("{n} cannot be stored as a decimal"))?;
            Value::from(decimal)
        }
        C::Char(_) | C::String(_) | C::Text => Value::from(text(value, max_length)?.to_owned()),
        C::Date => {
            let s = text(value, None)?;
            Value::from(
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map_err(|_| format!("'{s}' is not a date (expected YYYY-MM-DD)"))?,
            )
        }
        C::DateTime | C::Timestamp => Value::from(parse_datetime(text(value, None)?)?),
        C::TimestampWithTimeZone => {
            let s = text(value, None)?;
            let dt = match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => dt,
                Err(_) => parse_datetime(s)?.and_utc().fixed_offset(),
            };
            Value::from(dt)
        }
        C::Uuid => {
            let s = text(value, None)?;
            Value::from(Uuid::parse_str(s).map_err(|_| format!("'{s}' is not a UUID"))?)
        }
        C::Binary | C::VarBinary | C::Blob => {
            let s = text(value, None)?;
            Value::from(
                BASE64
                    .decode(s)
                    .map_err(|_| "expected base64 encoded bytes".to_string())?,
            )
        }
        C::Json | C::JsonBinary => match value {
            Json::Object(_) => Value::from(value.clone()),
            _ => return Err(expected("an object", value)),
        },
        C::Array(inner) => {
            let Json::Array(items) = value else {
                return Err(expected("an array", value));
            };
            let WireType::Array(item_wire) = wire else {
                return Err(expected("an array", value));
            };
            for (i, item) in items.iter().enumerate() {
                if item.is_null() {
                    return Err(format!("item {i} may not be null"));
                }
                to_storage(inner, item_wire, inner.max_length(), item, backend)
                    .map_err(|e| format!("item {i}: {e}"))?;
            }
            if backend == DbBackend::Postgres {
                Value::from(pg_array_literal(items))
            } else {
                Value::from(value.clone())
            }
        }
        C::Time => {
            let s = text(value, None)?;
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .map_err(|_| format!("'{s}' is not a time (expected HH:MM:SS)"))?;
            Value::from(s.to_owned())
        }
        C::Interval
        | C::Bit
        | C::VarBit
        | C::Cidr
        | C::Inet
        | C::MacAddr
        | C::Enum { .. }
        | C::Custom(_)
        | C::Unknown(_) => Value::from(wire_text(wire, value)?),
    };
    Ok(stored)
}

/// Text form of a value for columns bound as text.
fn wire_text(wire: &WireType, value: &Json) -> Result<String, String> {
    match wire {
        WireType::Enum(allowed) => {
            let s = text(value, None)?;
            if allowed.iter().any(|a| a == s) {
                Ok(s.to_owned())
            } else {
                Err(format!("'{s}' is not one of: {}", allowed.join(", ")))
            }
        }
        WireType::Integer => integer(value).map(|n| n.to_string()),
        WireType::Number => match value {
            Json::Number(n) => Ok(n.to_string()),
            _ => Err(expected("a number", value)),
        },
        WireType::Boolean => value
            .as_bool()
            .map(|b| b.to_string())
            .ok_or_else(|| expected("a boolean", value)),
        WireType::Object | WireType::Array(_) => match value {
            Json::Object(_) | Json::Array(_) => Ok(value.to_string()),
            _ => Err(expected("an object", value)),
        },
        WireType::String | WireType::Date | WireType::DateTime | WireType::Binary => {
            text(value, None).map(str::to_owned)
        }
    }
}

fn from_text(wire: &WireType, text: String) -> Json {
    match wire {
        WireType::Integer => match text.trim().parse::<i64>() {
            Ok(n) => Json::from(n),
            Err(_) => Json::String(text),
        },
        WireType::Number => number_from_text(&text),
        WireType::Boolean => match text.as_str() {
            "t" | "true" | "1" => Json::Bool(true),
            "f" | "false" | "0" => Json::Bool(false),
            _ => Json::String(text),
        },
        WireType::Object | WireType::Array(_) => {
            serde_json::from_str(&text).unwrap_or(Json::String(text))
        }
        _ => Json::String(text),
    }
}

fn number_from_text(text: &str) -> Json {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | 'e' | 'E'))
        .collect();
    digits
        .parse::<f64>()
        .map_or_else(|_| Json::String(text.to_owned()), Json::from)
}

fn pg_array_literal(items: &[Json]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Json::Array(inner) => pg_array_literal(inner),
            Json::Null => "NULL".to_string(),
            Json::Bool(b) => b.to_string(),
            Json::Number(n) => n.to_string(),
            Json::String(s) => quote_element(s),
            Json::Object(_) => quote_element(&item.to_string()),
        })
        .collect();
    format!("{{{}}}", parts.join(","))
}

fn quote_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
