//! Immutable structural summaries of entities.
//!
//! An [`EntitySource`] is anything that can describe an entity's columns: a
//! sea-orm entity, or a hand-written [`EntityDef`](crate::source::EntityDef).
//! [`build`] validates what a source reports and freezes it into an
//! [`EntityDescriptor`]. Nothing downstream ever looks at the source again.

use crate::types::TypeCategory;
use thiserror::Error;

/// Target of a foreign key column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

/// One column of an entity, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_category: TypeCategory,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub has_default: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl ColumnDescriptor {
    /// A non-nullable column without default, key or reference.
    pub fn new(name: impl Into<String>, type_category: TypeCategory) -> Self {
        Self {
            name: name.into(),
            type_category,
            nullable: false,
            is_primary_key: false,
            has_default: false,
            foreign_key: None,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the column as primary key. Keys assigned by storage (auto
    /// increment, server default) should also call [`Self::with_default`].
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

/// Capability of describing one persistent entity.
pub trait EntitySource: Send + Sync {
    /// Public name of the entity, unique across the registry.
    fn entity_name(&self) -> String;

    /// Storage table, `None` when the entity is not bound to a table.
    fn table_name(&self) -> Option<String>;

    /// Columns in declaration order.
    fn columns(&self) -> Vec<ColumnDescriptor>;

    /// Name of the declaring type, used in conflict reports.
    fn source_name(&self) -> String {
        self.entity_name()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("entity '{entity}' has no primary key column")]
    MissingPrimaryKey { entity: String },
    #[error("entity '{entity}' has a composite primary key ({columns:?}); exactly one key column is supported")]
    CompositePrimaryKey { entity: String, columns: Vec<String> },
    #[error("entity '{entity}' declares column '{column}' more than once")]
    DuplicateColumn { entity: String, column: String },
    #[error("entity '{entity}' is not bound to a table")]
    MissingTable { entity: String },
}

/// Frozen description of an entity with exactly one primary key column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    entity_name: String,
    table_name: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: usize,
}

impl EntityDescriptor {
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn primary_key(&self) -> &ColumnDescriptor {
        &self.columns[self.primary_key]
    }
}

/// Validate a source and freeze it into a descriptor.
///
/// # Errors
///
/// Returns a [`DescriptorError`] when the source has no table, repeats a
/// column name, or does not declare exactly one primary key column.
pub fn build(source: &dyn EntitySource) -> Result<EntityDescriptor, DescriptorError> {
    let entity = source.entity_name();

    let table_name = source
        .table_name()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| DescriptorError::MissingTable {
            entity: entity.clone(),
        })?;

    let columns = source.columns();
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].iter().any(|c| c.name == column.name) {
            return Err(DescriptorError::DuplicateColumn {
                entity,
                column: column.name.clone(),
            });
        }
    }

    let keys: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.is_primary_key.then_some(i))
        .collect();

    let primary_key = match keys.as_slice() {
        [] => return Err(DescriptorError::MissingPrimaryKey { entity }),
        [single] => *single,
        many => {
            return Err(DescriptorError::CompositePrimaryKey {
                entity,
                columns: many.iter().map(|&i| columns[i].name.clone()).collect(),
            });
        }
    };

    Ok(EntityDescriptor {
        entity_name: entity,
        table_name,
        columns,
        primary_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::EntityDef;

    fn user_def() -> EntityDef {
        EntityDef::new("User", "user")
            .column(
                ColumnDescriptor::new("id", TypeCategory::Integer)
                    .primary_key()
                    .with_default(),
            )
            .column(ColumnDescriptor::new("username", TypeCategory::String(Some(80))))
            .column(ColumnDescriptor::new("bio", TypeCategory::Text).nullable())
    }

    #[test]
    fn test_build_preserves_declaration_order() {
        let descriptor = build(&user_def()).unwrap();
        let names: Vec<&str> = descriptor.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "username", "bio"]);
        assert_eq!(descriptor.primary_key().name, "id");
        assert_eq!(descriptor.table_name(), "user");
    }

    #[test]
    fn test_missing_primary_key() {
        let def = EntityDef::new("Link", "link")
            .column(ColumnDescriptor::new("a_id", TypeCategory::Integer))
            .column(ColumnDescriptor::new("b_id", TypeCategory::Integer));
        assert_eq!(
            build(&def),
            Err(DescriptorError::MissingPrimaryKey {
                entity: "Link".into()
            })
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let def = EntityDef::new("Link", "link")
            .column(ColumnDescriptor::new("a_id", TypeCategory::Integer).primary_key())
            .column(ColumnDescriptor::new("b_id", TypeCategory::Integer).primary_key());
        assert!(matches!(
            build(&def),
            Err(DescriptorError::CompositePrimaryKey { columns, .. }) if columns == ["a_id", "b_id"]
        ));
    }

    #[test]
    fn test_duplicate_column() {
        let def = user_def().column(ColumnDescriptor::new("bio", TypeCategory::Text));
        assert_eq!(
            build(&def),
            Err(DescriptorError::DuplicateColumn {
                entity: "User".into(),
                column: "bio".into()
            })
        );
    }

    #[test]
    fn test_blank_table_name() {
        let def = EntityDef::new("Ghost", " ")
            .column(ColumnDescriptor::new("id", TypeCategory::Integer).primary_key());
        assert!(matches!(build(&def), Err(DescriptorError::MissingTable { .. })));
    }
}
