//! Descriptor-driven statements and the per-request write session.
//!
//! Every statement is assembled at runtime with `sea_query` from an
//! [`EntityDescriptor`], so one set of functions serves all entities. The free
//! functions run on any connection; [`Session`] wraps the transaction a
//! mutating request works in.

use crate::codec;
use crate::descriptor::EntityDescriptor;
use crate::errors::ApiError;
use crate::schema::ApiModel;
use sea_orm::sea_query::{Alias, Asterisk, Expr, Order, Query, SelectStatement, SimpleExpr};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, QueryResult,
    Statement, TransactionTrait,
};
use serde_json::{Map, Value as Json};
use tracing::{debug, error};

fn table(descriptor: &EntityDescriptor) -> Alias {
    Alias::new(descriptor.table_name())
}

fn key_column(descriptor: &EntityDescriptor) -> Alias {
    Alias::new(descriptor.primary_key().name.as_str())
}

fn log(stmt: &Statement) {
    debug!(sql = %stmt.sql, "executing statement");
}

fn select(descriptor: &EntityDescriptor, backend: DbBackend) -> SelectStatement {
    let mut query = Query::select();
    for column in descriptor.columns() {
        query.expr_as(
            codec::projection(column, backend),
            Alias::new(column.name.as_str()),
        );
    }
    query.from(table(descriptor));
    query
}

/// Convert a row to a wire object, fields in model order.
fn decode_row(
    row: &QueryResult,
    descriptor: &EntityDescriptor,
    model: &ApiModel,
    backend: DbBackend,
) -> Result<Json, DbErr> {
    let mut object = Map::with_capacity(model.fields().len());
    for (column, field) in descriptor.columns().iter().zip(model.fields()) {
        object.insert(
            field.name.clone(),
            codec::decode(row, column, field, backend)?,
        );
    }
    Ok(Json::Object(object))
}

/// Row with the given primary key.
pub async fn get<C: ConnectionTrait>(
    conn: &C,
    descriptor: &EntityDescriptor,
    model: &ApiModel,
    key: SimpleExpr,
) -> Result<Option<Json>, DbErr> {
    let backend = conn.get_database_backend();
    let mut query = select(descriptor, backend);
    query.and_where(Expr::col(key_column(descriptor)).eq(key));

    let stmt = backend.build(&query);
    log(&stmt);
    conn.query_one(stmt)
        .await?
        .map(|row| decode_row(&row, descriptor, model, backend))
        .transpose()
}

/// Rows ordered by primary key, optionally restricted to `(offset, limit)`.
pub async fn all<C: ConnectionTrait>(
    conn: &C,
    descriptor: &EntityDescriptor,
    model: &ApiModel,
    window: Option<(u64, u64)>,
) -> Result<Vec<Json>, DbErr> {
    let backend = conn.get_database_backend();
    let mut query = select(descriptor, backend);
    query.order_by(key_column(descriptor), Order::Asc);
    if let Some((offset, limit)) = window {
        query.offset(offset).limit(limit);
    }

    let stmt = backend.build(&query);
    log(&stmt);
    conn.query_all(stmt)
        .await?
        .iter()
        .map(|row| decode_row(row, descriptor, model, backend))
        .collect()
}

/// Number of rows in `table`, or of rows whose `column` equals `value`.
pub async fn count<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    filter: Option<(&str, SimpleExpr)>,
) -> Result<u64, DbErr> {
    let backend = conn.get_database_backend();
    let mut query = Query::select();
    query
        .expr_as(Expr::col(Asterisk).count(), Alias::new("total"))
        .from(Alias::new(table));
    if let Some((column, value)) = filter {
        query.and_where(Expr::col(Alias::new(column)).eq(value));
    }

    let stmt = backend.build(&query);
    log(&stmt);
    let total = match conn.query_one(stmt).await? {
        Some(row) => row.try_get::<i64>("", "total")?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or_default())
}

/// Insert a row. Returns the storage-assigned primary key as a wire value.
pub async fn add<C: ConnectionTrait>(
    conn: &C,
    descriptor: &EntityDescriptor,
    model: &ApiModel,
    values: Vec<(String, SimpleExpr)>,
) -> Result<Json, DbErr> {
    let backend = conn.get_database_backend();
    let key = descriptor.primary_key();

    let mut query = Query::insert();
    query.into_table(table(descriptor));
    if values.is_empty() {
        query.or_default_values();
    } else {
        let (columns, exprs): (Vec<String>, Vec<SimpleExpr>) = values.into_iter().unzip();
        query
            .columns(columns.into_iter().map(Alias::new))
            .values(exprs)
            .map_err(|e| DbErr::Custom(e.to_string()))?;
    }

    if backend == DbBackend::MySql {
        let stmt = backend.build(&query);
        log(&stmt);
        let result = conn.execute(stmt).await?;
        return Ok(Json::from(result.last_insert_id()));
    }

    query.returning(Query::returning().expr(codec::returning(key, backend)));
    let stmt = backend.build(&query);
    log(&stmt);
    let row = conn
        .query_one(stmt)
        .await?
        .ok_or(DbErr::RecordNotInserted)?;
    let field = model
        .field(&key.name)
        .ok_or_else(|| DbErr::Custom(format!("no field for key column '{}'", key.name)))?;
    codec::decode(&row, key, field, backend)
}

/// Apply column assignments to the row with the given key.
pub async fn update<C: ConnectionTrait>(
    conn: &C,
    descriptor: &EntityDescriptor,
    key: SimpleExpr,
    values: Vec<(String, SimpleExpr)>,
) -> Result<u64, DbErr> {
    if values.is_empty() {
        return Ok(0);
    }
    let backend = conn.get_database_backend();
    let mut query = Query::update();
    query
        .table(table(descriptor))
        .values(
            values
                .into_iter()
                .map(|(column, expr)| (Alias::new(column), expr)),
        )
        .and_where(Expr::col(key_column(descriptor)).eq(key));

    let stmt = backend.build(&query);
    log(&stmt);
    Ok(conn.execute(stmt).await?.rows_affected())
}

pub async fn delete<C: ConnectionTrait>(
    conn: &C,
    descriptor: &EntityDescriptor,
    key: SimpleExpr,
) -> Result<u64, DbErr> {
    let backend = conn.get_database_backend();
    let mut query = Query::delete();
    query
        .from_table(table(descriptor))
        .and_where(Expr::col(key_column(descriptor)).eq(key));

    let stmt = backend.build(&query);
    log(&stmt);
    Ok(conn.execute(stmt).await?.rows_affected())
}

/// Transaction owned by one mutating request.
///
/// Ends exactly once, through [`Session::finish`], [`Session::commit`] or
/// [`Session::rollback`]. A session dropped without ending is rolled back by
/// the driver.
pub struct Session {
    txn: DatabaseTransaction,
}

impl Session {
    /// # Errors
    ///
    /// Storage error when no transaction can be started.
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, ApiError> {
        let txn = db.begin().await.map_err(ApiError::storage)?;
        Ok(Self { txn })
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// # Errors
    ///
    /// Conflict or storage error raised by the commit.
    pub async fn commit(self) -> Result<(), ApiError> {
        self.txn.commit().await.map_err(ApiError::from_db)
    }

    /// Roll back, logging rather than returning a failure to do so.
    pub async fn rollback(self) {
        if let Err(err) = self.txn.rollback().await {
            error!(error = ?err, "rollback failed");
        }
    }

    /// Commit on success, roll back on failure, and hand the outcome back.
    ///
    /// # Errors
    ///
    /// The error of `outcome`, or the commit error.
    pub async fn finish<T>(self, outcome: Result<T, ApiError>) -> Result<T, ApiError> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back");
                self.rollback().await;
                Err(err)
            }
        }
    }
}
