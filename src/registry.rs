//! Mapping registry and model discovery.

use crate::descriptor::{self, DescriptorError, EntityDescriptor, EntitySource};
use crate::errors::InitError;
use crate::source::SeaOrmEntity;
use sea_orm::EntityTrait;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tracing::debug;

/// Ordered set of declared entities.
///
/// ```rust,ignore
/// let mut registry = MappingRegistry::new();
/// registry
///     .register::<user::Entity>()
///     .register::<item::Entity>()
///     .register_as::<legacy_user::Entity>("LegacyUser");
/// ```
#[derive(Default)]
pub struct MappingRegistry {
    sources: Vec<Box<dyn EntitySource>>,
}

impl MappingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: EntityTrait>(&mut self) -> &mut Self {
        self.register_source(SeaOrmEntity::<E>::new())
    }

    pub fn register_as<E: EntityTrait>(&mut self, name: impl Into<String>) -> &mut Self {
        self.register_source(SeaOrmEntity::<E>::named(name))
    }

    pub fn register_source(&mut self, source: impl EntitySource + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn EntitySource> {
        self.sources.iter().map(|source| source.as_ref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Descriptors of every discovered entity, keyed by entity name.
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl EntityRegistry {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<EntityDescriptor>)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity whose table is `table`.
    #[must_use]
    pub fn by_table(&self, table: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.values().find(|e| e.table_name() == table)
    }
}

/// Build a descriptor for every registered entity.
///
/// Entities without a single primary key column (association tables) are
/// skipped. Any other descriptor problem aborts discovery.
///
/// # Errors
///
/// [`InitError::RegistryConflict`] when two sources share an entity name,
/// [`InitError::Descriptor`] for a malformed entity.
pub fn discover(registry: &MappingRegistry) -> Result<EntityRegistry, InitError> {
    let mut entities = BTreeMap::new();
    let mut declared_by: BTreeMap<String, String> = BTreeMap::new();

    for source in registry.sources() {
        let descriptor = match descriptor::build(source) {
            Ok(descriptor) => descriptor,
            Err(
                err @ (DescriptorError::MissingPrimaryKey { .. }
                | DescriptorError::CompositePrimaryKey { .. }),
            ) => {
                debug!(source = %source.source_name(), reason = %err, "excluding entity");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let name = descriptor.entity_name().to_owned();
        match declared_by.entry(name.clone()) {
            Entry::Occupied(first) => {
                return Err(InitError::RegistryConflict {
                    name,
                    first: first.get().clone(),
                    second: source.source_name(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(source.source_name());
            }
        }

        debug!(
            entity = %name,
            table = %descriptor.table_name(),
            columns = descriptor.columns().len(),
            "discovered entity"
        );
        entities.insert(name, Arc::new(descriptor));
    }

    Ok(EntityRegistry { entities })
}
