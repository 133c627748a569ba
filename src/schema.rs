//! API models synthesized from entity descriptors.

use crate::descriptor::EntityDescriptor;
use crate::types::{TypeCategory, TypeMap, WireType};
use tracing::warn;

/// One field of an API payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiField {
    pub name: String,
    pub wire_type: WireType,
    pub format: Option<&'static str>,
    pub nullable: bool,
    /// Returned in responses, never written from payloads. True for the primary key.
    pub read_only: bool,
    /// Must be present on create.
    pub required: bool,
    /// Read-only key that storage cannot assign, so create takes it from the
    /// payload. It stays out of [`ApiModel::required_fields`] but the
    /// OpenAPI document lists it as writable and required.
    pub client_assigned: bool,
    pub max_length: Option<u32>,
}

/// Ordered field list of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiModel {
    entity_name: String,
    fields: Vec<ApiField>,
}

impl ApiModel {
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    #[must_use]
    pub fn fields(&self) -> &[ApiField] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ApiField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &ApiField> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn read_only_fields(&self) -> impl Iterator<Item = &ApiField> {
        self.fields.iter().filter(|f| f.read_only)
    }

    /// Fields a create payload must carry: required fields plus a
    /// client-assigned key.
    pub fn create_fields(&self) -> impl Iterator<Item = &ApiField> {
        self.fields
            .iter()
            .filter(|f| f.required || f.client_assigned)
    }
}

/// Derive the API model of an entity. Pure: equal inputs give equal models.
#[must_use]
pub fn synthesize(descriptor: &EntityDescriptor, types: &TypeMap) -> ApiModel {
    let fields = descriptor
        .columns()
        .iter()
        .map(|column| {
            let class = types.classify(&column.type_category);
            if class.fallback {
                warn!(
                    entity = %descriptor.entity_name(),
                    column = %column.name,
                    storage_type = %column.type_category,
                    "unknown storage type, exposing it as string"
                );
            }

            let read_only = column.is_primary_key;
            ApiField {
                name: column.name.clone(),
                wire_type: class.wire_type,
                format: class.format,
                nullable: column.nullable,
                read_only,
                required: !column.nullable && !column.has_default && !read_only,
                client_assigned: read_only
                    && !column.has_default
                    && column.type_category != TypeCategory::Uuid,
                max_length: column.type_category.max_length(),
            }
        })
        .collect();

    ApiModel {
        entity_name: descriptor.entity_name().to_owned(),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ColumnDescriptor, build};
    use crate::source::EntityDef;

    fn item() -> EntityDescriptor {
        build(
            &EntityDef::new("Item", "item")
                .column(
                    ColumnDescriptor::new("id", TypeCategory::Integer)
                        .primary_key()
                        .with_default(),
                )
                .column(ColumnDescriptor::new("name", TypeCategory::String(Some(100))))
                .column(ColumnDescriptor::new("description", TypeCategory::Text).nullable())
                .column(ColumnDescriptor::new("in_stock", TypeCategory::Boolean).with_default())
                .column(
                    ColumnDescriptor::new("user_id", TypeCategory::Integer).references("user", "id"),
                ),
        )
        .unwrap()
    }

    #[test]
    fn test_primary_key_is_read_only_and_never_required() {
        let model = synthesize(&item(), &TypeMap::default());
        let id = model.field("id").unwrap();
        assert!(id.read_only);
        assert!(!id.required);
        assert!(model.required_fields().all(|f| f.name != "id"));
    }

    #[test]
    fn test_client_assigned_key_is_still_not_required() {
        let descriptor = build(
            &EntityDef::new("Tag", "tag")
                .column(ColumnDescriptor::new("code", TypeCategory::Text).primary_key()),
        )
        .unwrap();
        let model = synthesize(&descriptor, &TypeMap::default());
        let code = model.field("code").unwrap();
        assert!(code.read_only && code.client_assigned);
        assert_eq!(model.required_fields().count(), 0);
        let on_create: Vec<&str> = model.create_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(on_create, ["code"]);

        // Generated and defaulted keys stay server side.
        assert!(!synthesize(&item(), &TypeMap::default()).field("id").unwrap().client_assigned);
        let uuid_key = build(
            &EntityDef::new("Tag", "tag")
                .column(ColumnDescriptor::new("id", TypeCategory::Uuid).primary_key()),
        )
        .unwrap();
        let model = synthesize(&uuid_key, &TypeMap::default());
        assert!(!model.field("id").unwrap().client_assigned);
    }

    #[test]
    fn test_required_derivation() {
        let model = synthesize(&item(), &TypeMap::default());
        let required: Vec<&str> = model.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(required, ["name", "user_id"]);
        assert!(model.field("description").unwrap().nullable);
    }

    #[test]
    fn test_field_order_follows_columns() {
        let model = synthesize(&item(), &TypeMap::default());
        let names: Vec<&str> = model.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "description", "in_stock", "user_id"]);
        assert_eq!(model.field("name").unwrap().max_length, Some(100));
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let descriptor = item();
        let types = TypeMap::default();
        assert_eq!(synthesize(&descriptor, &types), synthesize(&descriptor, &types));
    }
}
