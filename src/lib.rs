//! # autocrud
//!
//! Derive a complete CRUD API for Axum from the Sea-ORM entities registered at
//! startup. No handler code is written per entity: every entity gets a route
//! group with list, create, retrieve, update (partial) and delete, driven by a
//! descriptor built from its column metadata.
//!
//! ```rust,ignore
//! use autocrud::{Api, ApiConfig, MappingRegistry};
//!
//! let mut registry = MappingRegistry::new();
//! registry.register::<user::Entity>().register::<item::Entity>();
//!
//! let mut api = Api::new(ApiConfig::default());
//! api.init(&db, &registry)?;
//! let app = api.router(); // GET/POST /api/users, GET/PUT/DELETE /api/users/{id}, ...
//! ```

mod codec;
mod session;

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod errors;
pub mod extension;
pub mod openapi;
pub mod pagination;
pub mod registry;
pub mod routes;
pub mod schema;
pub mod source;
pub mod types;

pub use config::{ApiConfig, ConfigError, PrefixStyle};
pub use descriptor::{ColumnDescriptor, DescriptorError, EntityDescriptor, EntitySource, ForeignKey};
pub use engine::{CrudEngine, Dependent, FieldSet, Page};
pub use errors::{ApiError, InitError};
pub use extension::Api;
pub use registry::{EntityRegistry, MappingRegistry, discover};
pub use routes::{Operation, OperationBinding, RouteGroup, RouteTable};
pub use schema::{ApiField, ApiModel, synthesize};
pub use source::{EntityDef, SeaOrmEntity};
pub use types::{Classification, TypeCategory, TypeMap, WireType};
