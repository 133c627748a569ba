//! # Extension Lifecycle
//!
//! [`Api`] owns everything derived from the mapping registry: descriptors, API
//! models, route groups and the OpenAPI document. They are built together by
//! one [`Api::init`] call and stay read-only until [`Api::reset`] drops them
//! together.
//!
//! ```rust,ignore
//! let db = Database::connect("sqlite::memory:").await?;
//!
//! let mut registry = MappingRegistry::new();
//! registry.register::<user::Entity>().register::<item::Entity>();
//!
//! let mut api = Api::new(ApiConfig::from_env()?);
//! api.init(&db, &registry)?;
//!
//! let app = api.router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

use crate::config::ApiConfig;
use crate::descriptor::EntityDescriptor;
use crate::engine::{CrudEngine, Dependent};
use crate::errors::InitError;
use crate::openapi;
use crate::registry::{EntityRegistry, MappingRegistry, discover};
use crate::routes::{self, RouteGroup, RouteTable};
use crate::schema::{ApiModel, synthesize};
use crate::types::{TypeMap, WireType};
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::openapi::OpenApi;

/// Everything one initialization produces.
struct Built {
    entities: EntityRegistry,
    models: BTreeMap<String, Arc<ApiModel>>,
    routes: RouteTable,
    openapi: Arc<OpenApi>,
}

#[derive(Default)]
pub struct Api {
    config: ApiConfig,
    types: TypeMap,
    built: Option<Built>,
}

impl Api {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            types: TypeMap::default(),
            built: None,
        }
    }

    #[must_use]
    pub fn with_type_map(mut self, types: TypeMap) -> Self {
        self.types = types;
        self
    }

    /// Map a custom storage type name to a wire type. Only affects the next
    /// [`Api::init`].
    pub fn register_type(&mut self, name: &str, wire_type: WireType) -> &mut Self {
        if self.is_initialized() {
            warn!(type_name = %name, "type registered after initialization is ignored until reset");
        }
        self.types.register(name, wire_type);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.built.is_some()
    }

    /// Discover entities, synthesize their models and generate their routes.
    ///
    /// Nothing is kept unless every step succeeds. Calling `init` again on an
    /// initialized `Api` logs a warning and changes nothing.
    ///
    /// # Errors
    ///
    /// The first [`InitError`] met. The `Api` stays uninitialized.
    pub fn init(
        &mut self,
        db: &DatabaseConnection,
        registry: &MappingRegistry,
    ) -> Result<(), InitError> {
        if self.is_initialized() {
            warn!("already initialized, ignoring init; call reset() first to rebuild");
            return Ok(());
        }

        let entities = discover(registry)?;
        let mut dependents = dependents_of(&entities);
        let mut models = BTreeMap::new();
        let mut routes = RouteTable::default();

        for (name, descriptor) in entities.iter() {
            let model = Arc::new(synthesize(descriptor, &self.types));
            let engine = Arc::new(CrudEngine::new(
                Arc::clone(descriptor),
                Arc::clone(&model),
                dependents.remove(name).unwrap_or_default(),
            ));
            let prefix = self
                .config
                .prefix_for(descriptor.entity_name(), descriptor.table_name());
            routes.register(routes::generate(engine, db.clone(), &prefix, &self.config)?)?;
            models.insert(name.to_owned(), model);
        }

        if let Some(path) = self.openapi_path() {
            if routes.serves(&path) {
                return Err(InitError::DuplicateRoute {
                    name: "openapi".to_owned(),
                    prefix: path,
                });
            }
        }

        let openapi = openapi::document(
            &self.config,
            routes.iter().filter_map(|group| {
                models
                    .get(group.entity_name())
                    .map(|model| (group, Arc::as_ref(model)))
            }),
        );

        info!(
            entities = entities.len(),
            route_groups = routes.len(),
            base_path = %self.config.base_path,
            "API initialized"
        );
        self.built = Some(Built {
            entities,
            models,
            routes,
            openapi: Arc::new(openapi),
        });
        Ok(())
    }

    /// Drop every descriptor, model and route so that `init` may run again.
    pub fn reset(&mut self) {
        if self.built.take().is_some() {
            info!("API reset");
        }
    }

    fn openapi_path(&self) -> Option<String> {
        self.config
            .openapi_path
            .as_deref()
            .map(|path| format!("/{}", path.trim_matches('/')))
    }

    /// Router serving every route group, plus the OpenAPI document when
    /// `openapi_path` is set. Empty before initialization.
    #[must_use]
    pub fn router(&self) -> Router {
        let Some(built) = &self.built else {
            warn!("router requested before initialization");
            return Router::new();
        };
        let router = built.routes.router();
        match self.openapi_path() {
            Some(path) => {
                let document = Arc::clone(&built.openapi);
                router.route(
                    &path,
                    get(move || {
                        let document = Arc::clone(&document);
                        async move { Json(OpenApi::clone(&document)) }
                    }),
                )
            }
            None => router,
        }
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.built.as_ref()?.entities.get(name).map(Arc::as_ref)
    }

    #[must_use]
    pub fn api_model(&self, name: &str) -> Option<&ApiModel> {
        self.built.as_ref()?.models.get(name).map(Arc::as_ref)
    }

    #[must_use]
    pub fn route_group(&self, name: &str) -> Option<&RouteGroup> {
        self.built.as_ref()?.routes.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.built
            .iter()
            .flat_map(|built| built.entities.iter().map(|(_, d)| Arc::as_ref(d)))
    }

    pub fn api_models(&self) -> impl Iterator<Item = &ApiModel> {
        self.built
            .iter()
            .flat_map(|built| built.models.values().map(Arc::as_ref))
    }

    pub fn route_groups(&self) -> impl Iterator<Item = &RouteGroup> {
        self.built.iter().flat_map(|built| built.routes.iter())
    }

    #[must_use]
    pub fn openapi(&self) -> Option<&OpenApi> {
        self.built.as_ref().map(|built| &*built.openapi)
    }
}

/// For every entity, the entities whose foreign keys point at its primary key.
fn dependents_of(entities: &EntityRegistry) -> BTreeMap<String, Vec<Dependent>> {
    let mut dependents: BTreeMap<String, Vec<Dependent>> = BTreeMap::new();
    for (name, descriptor) in entities.iter() {
        for column in descriptor.columns() {
            let Some(fk) = &column.foreign_key else {
                continue;
            };
            let Some(target) = entities.by_table(&fk.table) else {
                debug!(entity = %name, column = %column.name, table = %fk.table, "foreign key to an undiscovered table");
                continue;
            };
            if target.primary_key().name != fk.column {
                continue;
            }
            dependents
                .entry(target.entity_name().to_owned())
                .or_default()
                .push(Dependent {
                    entity: name.to_owned(),
                    table: descriptor.table_name().to_owned(),
                    column: column.name.clone(),
                    nullable: column.nullable,
                });
        }
    }
    dependents
}
