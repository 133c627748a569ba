#![allow(dead_code)]

use autocrud::{Api, ApiConfig, MappingRegistry};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};
use serde_json::Value;
use tower::ServiceExt;

pub mod gadget_entity;
pub mod item_entity;
pub mod user_entity;

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    db.execute(backend.build(&schema.create_table_from_entity(entity)))
        .await?;
    Ok(())
}

/// In-memory database holding the `user` and `item` tables.
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    create_table(&db, user_entity::Entity).await?;
    create_table(&db, item_entity::Entity).await?;
    Ok(db)
}

pub fn test_registry() -> MappingRegistry {
    let mut registry = MappingRegistry::new();
    registry
        .register::<user_entity::Entity>()
        .register::<item_entity::Entity>();
    registry
}

pub async fn setup_test_api() -> (Api, DatabaseConnection) {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let mut api = Api::new(ApiConfig::default());
    api.init(&db, &test_registry())
        .expect("Failed to initialize API");
    (api, db)
}

pub async fn setup_test_app() -> Router {
    let (api, _db) = setup_test_api().await;
    api.router()
}

/// Response status, headers and JSON body (`Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> TestResponse {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put(app: &Router, uri: &str, body: Value) -> TestResponse {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str) -> TestResponse {
    send(app, Method::DELETE, uri, None).await
}
