//! Route groups: one set of CRUD endpoints per entity.
//!
//! | method | path | operation | success |
//! |---|---|---|---|
//! | `GET` | `{prefix}` and `{prefix}/` | list | 200 |
//! | `POST` | `{prefix}` and `{prefix}/` | create | 201 |
//! | `GET` | `{prefix}/{id}` | retrieve | 200 |
//! | `PUT` | `{prefix}/{id}` | update | 200 |
//! | `DELETE` | `{prefix}/{id}` | delete | 204 |

use crate::config::ApiConfig;
use crate::engine::CrudEngine;
use crate::errors::{ApiError, InitError};
use crate::pagination::{ListParams, calculate_content_range, parse_range};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    List,
    Create,
    Retrieve,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Self; 5] = [
        Self::List,
        Self::Create,
        Self::Retrieve,
        Self::Update,
        Self::Delete,
    ];

    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Self::List | Self::Retrieve => Method::GET,
            Self::Create => Method::POST,
            Self::Update => Method::PUT,
            Self::Delete => Method::DELETE,
        }
    }

    #[must_use]
    pub fn success(self) -> StatusCode {
        match self {
            Self::Create => StatusCode::CREATED,
            Self::Delete => StatusCode::NO_CONTENT,
            Self::List | Self::Retrieve | Self::Update => StatusCode::OK,
        }
    }

    /// Whether the path addresses one row through `{id}`.
    #[must_use]
    pub fn is_item(self) -> bool {
        matches!(self, Self::Retrieve | Self::Update | Self::Delete)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationBinding {
    pub operation: Operation,
    pub method: Method,
    /// Path template, `{id}` standing for the primary key.
    pub path: String,
}

/// Handler state shared by the routes of one group.
#[derive(Clone)]
pub struct EntityState {
    engine: Arc<CrudEngine>,
    db: DatabaseConnection,
    resource: Arc<str>,
    max_page_size: u64,
}

/// The CRUD endpoints of one entity.
#[derive(Clone, Debug)]
pub struct RouteGroup {
    entity_name: String,
    prefix: String,
    url_prefix: String,
    operations: Vec<OperationBinding>,
    router: Router,
}

impl RouteGroup {
    #[must_use]
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// URL segment of the entity, e.g. `users`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mounted path of the collection, e.g. `/api/users`.
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationBinding] {
        &self.operations
    }

    #[must_use]
    pub fn binding(&self, operation: Operation) -> Option<&OperationBinding> {
        self.operations.iter().find(|b| b.operation == operation)
    }

    /// Stateless router serving this group.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the route group of one entity.
///
/// # Errors
///
/// [`InitError::InvalidPrefix`] when `prefix` is empty, spans more than one
/// path segment, or the mounted path carries route syntax (`{`, `}`, or a
/// segment starting with `:` or `*`).
pub fn generate(
    engine: Arc<CrudEngine>,
    db: DatabaseConnection,
    prefix: &str,
    config: &ApiConfig,
) -> Result<RouteGroup, InitError> {
    let entity_name = engine.descriptor().entity_name().to_owned();
    let segment = prefix.trim_matches('/');
    let url_prefix = config.mount(segment);
    if segment.is_empty() || segment.contains('/') || !is_literal_path(&url_prefix) {
        return Err(InitError::InvalidPrefix {
            name: entity_name,
            prefix: prefix.to_owned(),
        });
    }
    let item_path = format!("{url_prefix}/{{id}}");

    let operations = Operation::ALL
        .into_iter()
        .map(|operation| OperationBinding {
            operation,
            method: operation.method(),
            path: if operation.is_item() {
                item_path.clone()
            } else {
                url_prefix.clone()
            },
        })
        .collect::<Vec<_>>();
    for binding in &operations {
        debug!(entity = %entity_name, method = %binding.method, path = %binding.path, "generated route");
    }

    let state = EntityState {
        engine,
        db,
        resource: Arc::from(segment),
        max_page_size: config.max_page_size,
    };
    let router = Router::new()
        .route(&url_prefix, get(list_all).post(create_one))
        .route(&format!("{url_prefix}/"), get(list_all).post(create_one))
        .route(&item_path, get(get_one).put(update_one).delete(delete_one))
        .with_state(state);

    Ok(RouteGroup {
        entity_name,
        prefix: segment.to_owned(),
        url_prefix,
        operations,
        router,
    })
}

fn is_literal_path(path: &str) -> bool {
    path.split('/').all(|part| {
        !part.starts_with([':', '*'])
            && !part.contains(['{', '}'])
            && !part.chars().any(|c| c.is_whitespace() || c.is_control())
    })
}

/// Registered route groups, unique by entity name and by mounted path.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    groups: BTreeMap<String, RouteGroup>,
}

impl RouteTable {
    /// # Errors
    ///
    /// [`InitError::DuplicateRoute`] when the entity name or the mounted path
    /// is already taken.
    pub fn register(&mut self, group: RouteGroup) -> Result<(), InitError> {
        if self
            .groups
            .values()
            .any(|existing| existing.url_prefix == group.url_prefix)
        {
            return Err(InitError::DuplicateRoute {
                name: group.entity_name,
                prefix: group.url_prefix,
            });
        }
        match self.groups.entry(group.entity_name.clone()) {
            Entry::Occupied(_) => Err(InitError::DuplicateRoute {
                name: group.entity_name,
                prefix: group.url_prefix,
            }),
            Entry::Vacant(slot) => {
                slot.insert(group);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, entity_name: &str) -> Option<&RouteGroup> {
        self.groups.get(entity_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteGroup> {
        self.groups.values()
    }

    /// Whether `path` is served by one of the groups.
    #[must_use]
    pub fn serves(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        self.groups.values().any(|g| {
            path == g.url_prefix
                || path
                    .strip_prefix(g.url_prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|id| !id.is_empty() && !id.contains('/'))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All groups merged into one router.
    #[must_use]
    pub fn router(&self) -> Router {
        self.groups
            .values()
            .fold(Router::new(), |router, group| router.merge(group.router()))
    }
}

fn bad_body(rejection: &JsonRejection) -> ApiError {
    ApiError::invalid(rejection.body_text())
}

async fn list_all(
    State(state): State<EntityState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<(HeaderMap, Json<Vec<Value>>), ApiError> {
    let Query(params) = params.map_err(|e| ApiError::invalid(e.body_text()))?;
    let window = parse_range(params.range.as_deref(), state.max_page_size)?;
    let page = state.engine.list(&state.db, window).await?;
    let returned = u64::try_from(page.rows.len()).unwrap_or(u64::MAX);
    let headers = calculate_content_range(page.offset, returned, page.total, &state.resource);
    Ok((headers, Json(page.rows)))
}

async fn create_one(
    State(state): State<EntityState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(payload) = payload.map_err(|e| bad_body(&e))?;
    let row = state.engine.create(&state.db, payload).await?;
    Ok((Operation::Create.success(), Json(row)))
}

async fn get_one(
    State(state): State<EntityState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.engine.retrieve(&state.db, &id).await?))
}

async fn update_one(
    State(state): State<EntityState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_body(&e))?;
    Ok(Json(state.engine.update(&state.db, &id, payload).await?))
}

async fn delete_one(
    State(state): State<EntityState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(&state.db, &id).await?;
    Ok(Operation::Delete.success())
}
