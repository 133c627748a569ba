//! Entity sources: the bridge between declared entities and descriptors.
//!
//! [`SeaOrmEntity`] reads a sea-orm entity through its traits (columns,
//! primary key, relations) without any generated code. [`EntityDef`] is the
//! declarative alternative for tables that have no sea-orm entity.

use crate::descriptor::{ColumnDescriptor, EntitySource, ForeignKey};
use crate::types::TypeCategory;
use heck::ToUpperCamelCase;
use sea_orm::sea_query::{ColumnType, StringLen, TableRef};
use sea_orm::{
    ColumnTrait, EntityTrait, IdenStatic, Identity, Iterable, PrimaryKeyToColumn, PrimaryKeyTrait,
    RelationTrait,
};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Translate a sea-orm column type into the storage catalog.
#[must_use]
pub fn column_category(column_type: &ColumnType) -> TypeCategory {
    match column_type {
        ColumnType::Char(len) => TypeCategory::Char(*len),
        ColumnType::String(len) => TypeCategory::String(match len {
            StringLen::N(n) => Some(*n),
            StringLen::Max | StringLen::None => None,
        }),
        ColumnType::Text => TypeCategory::Text,
        ColumnType::Blob => TypeCategory::Blob,
        ColumnType::TinyInteger => TypeCategory::TinyInteger,
        ColumnType::SmallInteger => TypeCategory::SmallInteger,
        ColumnType::Integer => TypeCategory::Integer,
        ColumnType::BigInteger => TypeCategory::BigInteger,
        ColumnType::TinyUnsigned => TypeCategory::TinyUnsigned,
        ColumnType::SmallUnsigned => TypeCategory::SmallUnsigned,
        ColumnType::Unsigned => TypeCategory::Unsigned,
        ColumnType::BigUnsigned => TypeCategory::BigUnsigned,
        ColumnType::Float => TypeCategory::Float,
        ColumnType::Double => TypeCategory::Double,
        ColumnType::Decimal(_) => TypeCategory::Decimal,
        ColumnType::Money(_) => TypeCategory::Money,
        ColumnType::DateTime => TypeCategory::DateTime,
        ColumnType::Timestamp => TypeCategory::Timestamp,
        ColumnType::TimestampWithTimeZone => TypeCategory::TimestampWithTimeZone,
        ColumnType::Time => TypeCategory::Time,
        ColumnType::Date => TypeCategory::Date,
        ColumnType::Year => TypeCategory::Year,
        ColumnType::Interval(..) => TypeCategory::Interval,
        ColumnType::Binary(_) => TypeCategory::Binary,
        ColumnType::VarBinary(_) => TypeCategory::VarBinary,
        ColumnType::Bit(_) => TypeCategory::Bit,
        ColumnType::VarBit(_) => TypeCategory::VarBit,
        ColumnType::Boolean => TypeCategory::Boolean,
        ColumnType::Json => TypeCategory::Json,
        ColumnType::JsonBinary => TypeCategory::JsonBinary,
        ColumnType::Uuid => TypeCategory::Uuid,
        ColumnType::Cidr => TypeCategory::Cidr,
        ColumnType::Inet => TypeCategory::Inet,
        ColumnType::MacAddr => TypeCategory::MacAddr,
        ColumnType::Custom(name) => TypeCategory::Custom(name.to_string()),
        ColumnType::Enum { name, variants } => TypeCategory::Enum {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        },
        ColumnType::Array(element) => TypeCategory::Array(Box::new(column_category(element))),
        ColumnType::Vector(_) => TypeCategory::Unknown("vector".into()),
        ColumnType::LTree => TypeCategory::Unknown("ltree".into()),
        other => TypeCategory::Unknown(format!("{other:?}")),
    }
}

/// A sea-orm entity viewed as an [`EntitySource`].
pub struct SeaOrmEntity<E> {
    name: Option<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: EntityTrait> SeaOrmEntity<E> {
    /// Entity named after its table in `UpperCamelCase` (`test_user` becomes `TestUser`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            _entity: PhantomData,
        }
    }
}

impl<E: EntityTrait> Default for SeaOrmEntity<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> EntitySource for SeaOrmEntity<E> {
    fn entity_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| E::default().table_name().to_upper_camel_case())
    }

    fn table_name(&self) -> Option<String> {
        let entity = E::default();
        let table = entity.table_name();
        if table.is_empty() {
            None
        } else {
            Some(table.to_owned())
        }
    }

    fn columns(&self) -> Vec<ColumnDescriptor> {
        let keys: Vec<String> = E::PrimaryKey::iter()
            .map(|key| key.into_column().as_str().to_owned())
            .collect();
        let auto_increment = <E::PrimaryKey as PrimaryKeyTrait>::auto_increment();
        let mut references = foreign_keys::<E>();

        E::Column::iter()
            .map(|column| {
                let def = column.def();
                let name = column.as_str();
                let is_primary_key = keys.iter().any(|key| key == name);
                ColumnDescriptor {
                    name: name.to_owned(),
                    type_category: column_category(def.get_column_type()),
                    nullable: def.is_null(),
                    is_primary_key,
                    has_default: def.get_column_default().is_some()
                        || (is_primary_key && auto_increment),
                    foreign_key: references.remove(name),
                }
            })
            .collect()
    }

    fn source_name(&self) -> String {
        std::any::type_name::<E>().to_owned()
    }
}

/// Belongs-to relations of `E`, keyed by the local column.
fn foreign_keys<E: EntityTrait>() -> HashMap<String, ForeignKey> {
    E::Relation::iter()
        .map(|relation| relation.def())
        .filter(|def| !def.is_owner)
        .filter_map(|def| {
            let Identity::Unary(from) = &def.from_col else {
                return None;
            };
            let Identity::Unary(to) = &def.to_col else {
                return None;
            };
            let table = match &def.to_tbl {
                TableRef::Table(table)
                | TableRef::SchemaTable(_, table)
                | TableRef::DatabaseSchemaTable(_, _, table)
                | TableRef::TableAlias(table, _)
                | TableRef::SchemaTableAlias(_, table, _)
                | TableRef::DatabaseSchemaTableAlias(_, _, table, _) => table.to_string(),
                _ => return None,
            };
            Some((
                from.to_string(),
                ForeignKey {
                    table,
                    column: to.to_string(),
                },
            ))
        })
        .collect()
}

/// Declarative entity definition.
///
/// ```rust,ignore
/// let sample = EntityDef::new("Sample", "sample")
///     .column(ColumnDescriptor::new("id", TypeCategory::Integer).primary_key().with_default())
///     .column(ColumnDescriptor::new("tags", TypeCategory::Array(Box::new(TypeCategory::Text))));
/// registry.register_source(sample);
/// ```
#[derive(Clone, Debug)]
pub struct EntityDef {
    name: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }
}

impl EntitySource for EntityDef {
    fn entity_name(&self) -> String {
        self.name.clone()
    }

    fn table_name(&self) -> Option<String> {
        Some(self.table.clone())
    }

    fn columns(&self) -> Vec<ColumnDescriptor> {
        self.columns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{Alias, SeaRc};

    #[test]
    fn test_string_length_is_kept() {
        assert_eq!(
            column_category(&ColumnType::String(StringLen::N(80))),
            TypeCategory::String(Some(80))
        );
        assert_eq!(
            column_category(&ColumnType::String(StringLen::None)),
            TypeCategory::String(None)
        );
    }

    #[test]
    fn test_enum_variants_are_named() {
        let column_type = ColumnType::Enum {
            name: SeaRc::new(Alias::new("mood")),
            variants: vec![SeaRc::new(Alias::new("happy")), SeaRc::new(Alias::new("sad"))],
        };
        assert_eq!(
            column_category(&column_type),
            TypeCategory::Enum {
                name: "mood".into(),
                variants: vec!["happy".into(), "sad".into()],
            }
        );
    }

    #[test]
    fn test_array_element_is_converted() {
        let column_type = ColumnType::Array(std::sync::Arc::new(ColumnType::Integer));
        assert_eq!(
            column_category(&column_type),
            TypeCategory::Array(Box::new(TypeCategory::Integer))
        );
    }

    #[test]
    fn test_custom_type_keeps_its_name() {
        let column_type = ColumnType::Custom(SeaRc::new(Alias::new("citext")));
        assert_eq!(column_category(&column_type), TypeCategory::Custom("citext".into()));
    }
}
