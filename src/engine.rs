//! # CRUD Handler Engine
//!
//! One [`CrudEngine`] per entity, parameterized by its descriptor and API
//! model. Handlers are transport agnostic: they take wire JSON and a
//! connection, and return wire JSON or an [`ApiError`].
//!
//! Mutating operations follow the same path:
//!
//! 1. validate the payload (nothing touches storage on a validation error)
//! 2. begin a [`Session`]
//! 3. apply the change
//! 4. commit, or roll back on any error before it is returned

use crate::codec;
use crate::descriptor::EntityDescriptor;
use crate::errors::ApiError;
use crate::schema::ApiModel;
use crate::session::{self, Session};
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr};
use serde_json::{Map, Value as Json};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Entity holding a foreign key to another entity's primary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependent {
    pub entity: String,
    pub table: String,
    pub column: String,
    pub nullable: bool,
}

/// Sparse update input: only the fields present in the payload.
///
/// An absent field and a field set to `null` are different things: the first
/// keeps the stored value, the second clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldSet(Map<String, Json>);

impl FieldSet {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Json> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Json> for FieldSet {
    type Error = ApiError;

    fn try_from(payload: Json) -> Result<Self, Self::Error> {
        match payload {
            Json::Object(fields) => Ok(Self(fields)),
            other => Err(ApiError::invalid(format!(
                "request body must be a JSON object, got {}",
                match other {
                    Json::Array(_) => "an array",
                    Json::Null => "null",
                    _ => "a scalar",
                }
            ))),
        }
    }
}

/// One page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub rows: Vec<Json>,
    pub offset: u64,
    pub total: u64,
}

pub struct CrudEngine {
    descriptor: Arc<EntityDescriptor>,
    model: Arc<ApiModel>,
    dependents: Vec<Dependent>,
}

impl CrudEngine {
    #[must_use]
    pub fn new(
        descriptor: Arc<EntityDescriptor>,
        model: Arc<ApiModel>,
        dependents: Vec<Dependent>,
    ) -> Self {
        Self {
            descriptor,
            model,
            dependents,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn model(&self) -> &ApiModel {
        &self.model
    }

    #[must_use]
    pub fn dependents(&self) -> &[Dependent] {
        &self.dependents
    }

    fn not_found(&self, key: &str) -> ApiError {
        ApiError::not_found(self.descriptor.entity_name(), Some(key.to_owned()))
    }

    /// Key from a path segment; an unparsable key cannot match a row.
    fn path_key(&self, raw: &str, backend: DbBackend) -> Result<SimpleExpr, ApiError> {
        let column = self.descriptor.primary_key();
        self.model
            .field(&column.name)
            .and_then(|field| codec::parse_key(column, field, raw, backend))
            .ok_or_else(|| self.not_found(raw))
    }

    /// Key from a wire value produced by storage or by key generation.
    fn stored_key(&self, key: &Json, backend: DbBackend) -> Result<SimpleExpr, ApiError> {
        let column = self.descriptor.primary_key();
        self.model
            .field(&column.name)
            .ok_or_else(|| format!("no field for key column '{}'", column.name))
            .and_then(|field| codec::encode(column, field, key, backend))
            .map_err(|e| ApiError::storage(DbErr::Custom(format!("unusable primary key {key}: {e}"))))
    }

    fn unknown_fields(&self, fields: &FieldSet) -> Vec<String> {
        fields
            .names()
            .filter(|name| self.model.field(name).is_none())
            .map(|name| format!("'{name}' is not a field of {}", self.descriptor.entity_name()))
            .collect()
    }

    /// All rows, or the `(offset, limit)` window of them.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn list(
        &self,
        db: &DatabaseConnection,
        window: Option<(u64, u64)>,
    ) -> Result<Page, ApiError> {
        let total = session::count(db, self.descriptor.table_name(), None)
            .await
            .map_err(ApiError::storage)?;
        let rows = session::all(db, &self.descriptor, &self.model, window)
            .await
            .map_err(ApiError::storage)?;
        Ok(Page {
            rows,
            offset: window.map_or(0, |(offset, _)| offset),
            total,
        })
    }

    /// # Errors
    ///
    /// `Validation` for a bad payload, `Conflict` when a constraint rejects
    /// the row, `Storage` otherwise.
    pub async fn create(&self, db: &DatabaseConnection, payload: Json) -> Result<Json, ApiError> {
        let backend = db.get_database_backend();
        let fields = FieldSet::try_from(payload)?;
        let (values, known_key) = self.prepare_create(&fields, backend)?;

        let session = Session::begin(db).await?;
        let outcome = self.insert(session.connection(), values, known_key).await;
        session.finish(outcome).await
    }

    fn prepare_create(
        &self,
        fields: &FieldSet,
        backend: DbBackend,
    ) -> Result<(Vec<(String, SimpleExpr)>, Option<Json>), ApiError> {
        let mut errors = self.unknown_fields(fields);
        let mut values = Vec::new();
        let mut known_key = None;

        for (column, field) in self.descriptor.columns().iter().zip(self.model.fields()) {
            let supplied = fields.get(&field.name);

            if field.read_only {
                if let Some(generated) = codec::generated_key(column) {
                    match codec::encode(column, field, &generated, backend) {
                        Ok(expr) => values.push((column.name.clone(), expr)),
                        Err(e) => errors.push(format!("'{}': {e}", field.name)),
                    }
                    known_key = Some(generated);
                } else if column.has_default {
                    if supplied.is_some() {
                        debug!(field = %field.name, "ignoring read-only field on create");
                    }
                } else {
                    // Storage cannot assign this key, so the client has to.
                    match supplied {
                        None => errors.push(format!("'{}' must be supplied", field.name)),
                        Some(value) => match codec::encode(column, field, value, backend) {
                            Ok(expr) => {
                                values.push((column.name.clone(), expr));
                                known_key = Some(value.clone());
                            }
                            Err(e) => errors.push(format!("'{}': {e}", field.name)),
                        },
                    }
                }
                continue;
            }

            match supplied {
                None if field.required => errors.push(format!("'{}' is required", field.name)),
                None => {}
                Some(value) => match codec::encode(column, field, value, backend) {
                    Ok(expr) => values.push((column.name.clone(), expr)),
                    Err(e) => errors.push(format!("'{}': {e}", field.name)),
                },
            }
        }

        if errors.is_empty() {
            Ok((values, known_key))
        } else {
            Err(ApiError::validation(errors))
        }
    }

    async fn insert(
        &self,
        conn: &DatabaseTransaction,
        values: Vec<(String, SimpleExpr)>,
        known_key: Option<Json>,
    ) -> Result<Json, ApiError> {
        let backend = conn.get_database_backend();
        let assigned = session::add(conn, &self.descriptor, &self.model, values).await?;
        let key_value = known_key.unwrap_or(assigned);
        let key = self.stored_key(&key_value, backend)?;

        session::get(conn, &self.descriptor, &self.model, key)
            .await?
            .ok_or_else(|| {
                ApiError::storage(DbErr::RecordNotFound(format!(
                    "{} {key_value} vanished after insert",
                    self.descriptor.entity_name()
                )))
            })
    }

    /// # Errors
    ///
    /// `NotFound` when no row has this key.
    pub async fn retrieve(&self, db: &DatabaseConnection, key: &str) -> Result<Json, ApiError> {
        let id = self.path_key(key, db.get_database_backend())?;
        session::get(db, &self.descriptor, &self.model, id)
            .await
            .map_err(ApiError::storage)?
            .ok_or_else(|| self.not_found(key))
    }

    /// Partial update: fields absent from `payload` keep their stored value.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation` (including an attempt to change the primary
    /// key), `Conflict` or `Storage`.
    pub async fn update(
        &self,
        db: &DatabaseConnection,
        key: &str,
        payload: Json,
    ) -> Result<Json, ApiError> {
        let id = self.path_key(key, db.get_database_backend())?;
        let fields = FieldSet::try_from(payload)?;
        let unknown = self.unknown_fields(&fields);
        if !unknown.is_empty() {
            return Err(ApiError::validation(unknown));
        }

        let session = Session::begin(db).await?;
        let outcome = self.merge(session.connection(), key, id, &fields).await;
        session.finish(outcome).await
    }

    async fn merge(
        &self,
        conn: &DatabaseTransaction,
        key: &str,
        id: SimpleExpr,
        fields: &FieldSet,
    ) -> Result<Json, ApiError> {
        let current = session::get(conn, &self.descriptor, &self.model, id.clone())
            .await?
            .ok_or_else(|| self.not_found(key))?;
        let values = self.prepare_update(fields, &current, conn.get_database_backend())?;

        if values.is_empty() {
            return Ok(current);
        }
        session::update(conn, &self.descriptor, id.clone(), values).await?;
        session::get(conn, &self.descriptor, &self.model, id)
            .await?
            .ok_or_else(|| self.not_found(key))
    }

    fn prepare_update(
        &self,
        fields: &FieldSet,
        current: &Json,
        backend: DbBackend,
    ) -> Result<Vec<(String, SimpleExpr)>, ApiError> {
        let mut errors = Vec::new();
        let mut values = Vec::new();

        for (column, field) in self.descriptor.columns().iter().zip(self.model.fields()) {
            let Some(value) = fields.get(&field.name) else {
                continue;
            };
            if field.read_only {
                let stored = current.get(&field.name).unwrap_or(&Json::Null);
                if !same_value(stored, value) {
                    errors.push(format!("'{}' is read-only and cannot be changed", field.name));
                }
                continue;
            }
            match codec::encode(column, field, value, backend) {
                Ok(expr) => values.push((column.name.clone(), expr)),
                Err(e) => errors.push(format!("'{}': {e}", field.name)),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(ApiError::validation(errors))
        }
    }

    /// Delete one row. Never cascades.
    ///
    /// # Errors
    ///
    /// `NotFound` when no row has this key, `Conflict` when a non-nullable
    /// foreign key still references it.
    pub async fn delete(&self, db: &DatabaseConnection, key: &str) -> Result<(), ApiError> {
        let id = self.path_key(key, db.get_database_backend())?;

        let session = Session::begin(db).await?;
        let outcome = self.remove(session.connection(), key, id).await;
        session.finish(outcome).await
    }

    async fn remove(
        &self,
        conn: &DatabaseTransaction,
        key: &str,
        id: SimpleExpr,
    ) -> Result<(), ApiError> {
        let key_column = self.descriptor.primary_key().name.as_str();
        let exists = session::count(
            conn,
            self.descriptor.table_name(),
            Some((key_column, id.clone())),
        )
        .await?;
        if exists == 0 {
            return Err(self.not_found(key));
        }

        for dependent in self.dependents.iter().filter(|d| !d.nullable) {
            let references =
                session::count(conn, &dependent.table, Some((&dependent.column, id.clone())))
                    .await?;
            if references > 0 {
                return Err(ApiError::conflict(format!(
                    "{} '{key}' is still referenced by {references} {} record(s)",
                    self.descriptor.entity_name(),
                    dependent.entity
                )));
            }
        }

        if session::delete(conn, &self.descriptor, id).await? == 0 {
            return Err(self.not_found(key));
        }
        Ok(())
    }
}

/// Equality of a stored wire value and a submitted one, tolerant of number
/// representation and UUID spelling.
fn same_value(stored: &Json, submitted: &Json) -> bool {
    match (stored, submitted) {
        (Json::Number(a), Json::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Json::String(a), Json::String(b)) => {
            a == b
                || matches!(
                    (Uuid::parse_str(a), Uuid::parse_str(b)),
                    (Ok(a), Ok(b)) if a == b
                )
        }
        _ => stored == submitted,
    }
}
