//! # Type Mapping
//!
//! Storage columns come in a large catalog of types (integer widths, vendor
//! network types, arrays, documents, enums, ...). API payloads only know a
//! handful of wire types. [`TypeMap::classify`] is the single place where one
//! is translated into the other.
//!
//! The table is total: a storage type it does not know maps to `string` with
//! [`Classification::fallback`] set, so discovery never fails because of an
//! exotic column. Callers can teach it about custom types before the API is
//! initialised:
//!
//! ```rust,ignore
//! let mut types = TypeMap::default();
//! types.register("citext", WireType::String);
//! types.register("ltree", WireType::String);
//! let api = Api::new(config).with_type_map(types);
//! ```

use std::collections::HashMap;
use std::fmt;

/// Storage-level type of one entity column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    TinyInteger,
    SmallInteger,
    Integer,
    BigInteger,
    TinyUnsigned,
    SmallUnsigned,
    Unsigned,
    BigUnsigned,
    Float,
    Double,
    Decimal,
    Money,
    Boolean,
    /// Fixed length character column, with its declared length.
    Char(Option<u32>),
    /// Variable length character column, with its declared maximum length.
    String(Option<u32>),
    Text,
    Date,
    Time,
    DateTime,
    Timestamp,
    TimestampWithTimeZone,
    Interval,
    Year,
    Binary,
    VarBinary,
    Blob,
    Bit,
    VarBit,
    Json,
    JsonBinary,
    Uuid,
    Cidr,
    Inet,
    MacAddr,
    Enum { name: String, variants: Vec<String> },
    Array(Box<TypeCategory>),
    /// A named vendor or user-defined type.
    Custom(String),
    /// Anything the persistence binding could not name more precisely.
    Unknown(String),
}

impl TypeCategory {
    /// Declared maximum length for character columns.
    #[must_use]
    pub fn max_length(&self) -> Option<u32> {
        match self {
            Self::Char(len) | Self::String(len) => *len,
            _ => None,
        }
    }

    /// Storage type name, as used in SQL casts and log messages.
    #[must_use]
    pub fn storage_name(&self) -> String {
        match self {
            Self::TinyInteger => "tinyint".into(),
            Self::SmallInteger => "smallint".into(),
            Self::Integer => "integer".into(),
            Self::BigInteger => "bigint".into(),
            Self::TinyUnsigned => "tinyint unsigned".into(),
            Self::SmallUnsigned => "smallint unsigned".into(),
            Self::Unsigned => "integer unsigned".into(),
            Self::BigUnsigned => "bigint unsigned".into(),
            Self::Float => "real".into(),
            Self::Double => "double precision".into(),
            Self::Decimal => "decimal".into(),
            Self::Money => "money".into(),
            Self::Boolean => "boolean".into(),
            Self::Char(_) => "char".into(),
            Self::String(_) => "varchar".into(),
            Self::Text => "text".into(),
            Self::Date => "date".into(),
            Self::Time => "time".into(),
            Self::DateTime | Self::Timestamp => "timestamp".into(),
            Self::TimestampWithTimeZone => "timestamptz".into(),
            Self::Interval => "interval".into(),
            Self::Year => "year".into(),
            Self::Binary | Self::VarBinary | Self::Blob => "bytea".into(),
            Self::Bit | Self::VarBit => "varbit".into(),
            Self::Json => "json".into(),
            Self::JsonBinary => "jsonb".into(),
            Self::Uuid => "uuid".into(),
            Self::Cidr => "cidr".into(),
            Self::Inet => "inet".into(),
            Self::MacAddr => "macaddr".into(),
            Self::Enum { name, .. } => name.clone(),
            Self::Array(inner) => format!("{}[]", inner.storage_name()),
            Self::Custom(name) | Self::Unknown(name) => name.clone(),
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_name())
    }
}

/// Type of a field in serialized API payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireType {
    Integer,
    Number,
    Boolean,
    String,
    Date,
    DateTime,
    /// Base64 encoded bytes.
    Binary,
    Object,
    Array(Box<WireType>),
    /// A string restricted to the listed values.
    Enum(Vec<String>),
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::String => f.write_str("string"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Binary => f.write_str("binary"),
            Self::Object => f.write_str("object"),
            Self::Array(inner) => write!(f, "array<{inner}>"),
            Self::Enum(values) => write!(f, "enum({})", values.join("|")),
        }
    }
}

/// Result of classifying one storage type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub wire_type: WireType,
    /// Serialization hint, in `OpenAPI` format vocabulary.
    pub format: Option<&'static str>,
    /// Set when the storage type was unknown and the `string` default was used.
    pub fallback: bool,
}

impl Classification {
    fn exact(wire_type: WireType, format: Option<&'static str>) -> Self {
        Self {
            wire_type,
            format,
            fallback: false,
        }
    }
}

/// Lookup table from [`TypeCategory`] to [`WireType`].
#[derive(Clone, Debug, Default)]
pub struct TypeMap {
    custom: HashMap<String, WireType>,
}

impl TypeMap {
    /// Map a custom or unknown storage type name to a wire type.
    ///
    /// Names are matched case-insensitively. Registering a name twice keeps the
    /// last mapping.
    pub fn register(&mut self, storage_name: impl Into<String>, wire_type: WireType) -> &mut Self {
        self.custom
            .insert(storage_name.into().to_ascii_lowercase(), wire_type);
        self
    }

    /// Builder flavour of [`TypeMap::register`].
    #[must_use]
    pub fn with(mut self, storage_name: impl Into<String>, wire_type: WireType) -> Self {
        self.register(storage_name, wire_type);
        self
    }

    #[must_use]
    pub fn classify(&self, category: &TypeCategory) -> Classification {
        use TypeCategory as C;

        match category {
            C::TinyInteger
            | C::SmallInteger
            | C::Integer
            | C::TinyUnsigned
            | C::SmallUnsigned
            | C::Unsigned => Classification::exact(WireType::Integer, Some("int32")),
            C::BigInteger | C::BigUnsigned => {
                Classification::exact(WireType::Integer, Some("int64"))
            }
            C::Year => Classification::exact(WireType::Integer, None),
            C::Float => Classification::exact(WireType::Number, Some("float")),
            C::Double => Classification::exact(WireType::Number, Some("double")),
            C::Decimal | C::Money => Classification::exact(WireType::Number, Some("decimal")),
            C::Boolean => Classification::exact(WireType::Boolean, None),
            C::Char(_) | C::String(_) | C::Text => Classification::exact(WireType::String, None),
            C::Date => Classification::exact(WireType::Date, Some("date")),
            C::DateTime | C::Timestamp | C::TimestampWithTimeZone => {
                Classification::exact(WireType::DateTime, Some("date-time"))
            }
            C::Time => Classification::exact(WireType::String, Some("time")),
            C::Interval => Classification::exact(WireType::String, Some("duration")),
            C::Binary | C::VarBinary | C::Blob => {
                Classification::exact(WireType::Binary, Some("byte"))
            }
            C::Bit | C::VarBit => Classification::exact(WireType::String, None),
            C::Json | C::JsonBinary => Classification::exact(WireType::Object, None),
            C::Uuid => Classification::exact(WireType::String, Some("uuid")),
            C::Cidr => Classification::exact(WireType::String, Some("cidr")),
            C::Inet => Classification::exact(WireType::String, Some("inet")),
            C::MacAddr => Classification::exact(WireType::String, Some("mac")),
            C::Enum { variants, .. } => {
                Classification::exact(WireType::Enum(variants.clone()), None)
            }
            C::Array(inner) => {
                let element = self.classify(inner);
                Classification {
                    wire_type: WireType::Array(Box::new(element.wire_type)),
                    format: None,
                    fallback: element.fallback,
                }
            }
            C::Custom(name) | C::Unknown(name) => match self.custom.get(&name.to_ascii_lowercase())
            {
                Some(wire_type) => Classification::exact(wire_type.clone(), None),
                None => Classification {
                    wire_type: WireType::String,
                    format: None,
                    fallback: true,
                },
            },
        }
    }
}
