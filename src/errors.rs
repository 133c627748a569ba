//! # Error Handling
//!
//! Two families of errors exist:
//!
//! - [`InitError`]: structural defects found while building the API
//!   (malformed entities, name clashes, route clashes). They abort startup.
//! - [`ApiError`]: request-time failures. They are turned into a JSON body
//!   with the matching status code, and the process keeps serving.
//!
//! Storage errors are logged with full detail through `tracing` and reach the
//! client only as a generic message:
//!
//! ```json
//! {"error": "A database error occurred"}
//! ```
//!
//! Validation errors list every problem found in the payload:
//!
//! ```json
//! {"error": "Validation failed", "details": ["'username' is required", "'email' is required"]}
//! ```

use crate::descriptor::DescriptorError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure while building the API from the mapping registry.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("entity name '{name}' is declared by both {first} and {second}")]
    RegistryConflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("route group '{name}' at '{prefix}' clashes with an existing route group")]
    DuplicateRoute { name: String, prefix: String },

    #[error("route group '{name}' has no usable URL prefix ('{prefix}')")]
    InvalidPrefix { name: String, prefix: String },
}

/// Request-time error, rendered as a sanitized JSON response.
#[derive(Debug)]
pub enum ApiError {
    /// 400 - payload, path or query could not be accepted.
    Validation { errors: Vec<String> },

    /// 404
    NotFound { resource: String, id: Option<String> },

    /// 409 - a storage constraint rejected the change.
    Conflict { message: String },

    /// 500 - details logged, never sent to the client.
    Storage { message: String, internal: DbErr },
}

impl ApiError {
    /// Create a 400 error carrying every problem found in a payload.
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    /// use axum::http::StatusCode;
    ///
    /// let err = ApiError::validation(vec![
    ///     "'username' is required".to_owned(),
    ///     "'email' is required".to_owned(),
    /// ]);
    /// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    /// ```
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    /// Create a 400 error with a single problem, e.g. a bad query parameter.
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    ///
    /// let err = ApiError::invalid("range must be [start, end]");
    /// assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    /// ```
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![error.into()],
        }
    }

    /// Create a 404 error for a row that does not exist.
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    ///
    /// let err = ApiError::not_found("User", Some("42".to_owned()));
    /// assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    /// ```
    pub fn not_found(resource: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    /// Create a 409 error. The message is sent to the client as is.
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    ///
    /// let err = ApiError::conflict("User 7 is still referenced by Item");
    /// assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    /// ```
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a 500 error from a storage failure, without classifying it.
    ///
    /// The client only sees a generic message; `err` is logged when the
    /// response is built.
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    /// use sea_orm::DbErr;
    ///
    /// let err = ApiError::storage(DbErr::Custom("disk full".to_owned()));
    /// assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    /// assert_eq!(err.to_string(), "A database error occurred");
    /// ```
    pub fn storage(err: DbErr) -> Self {
        Self::Storage {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    /// Classify a storage error: constraint violations become
    /// [`ApiError::Conflict`], everything else [`ApiError::Storage`].
    ///
    /// # Example
    ///
    /// ```
    /// use autocrud::ApiError;
    /// use sea_orm::DbErr;
    ///
    /// let err = ApiError::from_db(DbErr::RecordNotInserted);
    /// assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    /// ```
    pub fn from_db(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::debug!(detail = %detail, "unique constraint violated");
                Self::conflict("A record with the same unique value already exists")
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                tracing::debug!(detail = %detail, "foreign key constraint violated");
                Self::conflict("The change violates a reference between records")
            }
            _ => Self::storage(err),
        }
    }

    /// HTTP status the error is rendered with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Validation { errors } => {
                if errors.len() == 1 {
                    errors[0].clone()
                } else {
                    format!("Validation failed: {}", errors.join(", "))
                }
            }
            Self::NotFound { resource, id } => match id {
                Some(id) => format!("{resource} with ID '{id}' not found"),
                None => format!("{resource} not found"),
            },
            Self::Conflict { message } | Self::Storage { message, .. } => message.clone(),
        }
    }

    fn log_internal(&self) {
        match self {
            Self::Storage { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let body = match &self {
            Self::Validation { errors } => ErrorResponse {
                error: "Validation failed".to_string(),
                details: Some(errors.clone()),
            },
            _ => ErrorResponse {
                error: self.user_message(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for ApiError {}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        Self::from_db(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_bad_request() {
        let err = ApiError::invalid("'username' is required");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "'username' is required");
    }

    #[test]
    fn test_validation_joins_multiple_errors() {
        let err = ApiError::validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.user_message(), "Validation failed: a, b");
    }

    #[test]
    fn test_not_found_message() {
        let err = ApiError::not_found("User", Some("7".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "User with ID '7' not found");
        assert_eq!(ApiError::not_found("User", None).to_string(), "User not found");
    }

    #[test]
    fn test_storage_error_is_sanitized() {
        let err = ApiError::from(DbErr::Custom("relation \"secret_table\" does not exist".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "A database error occurred");
        assert!(!err.to_string().contains("secret_table"));
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(ApiError::conflict("taken").status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_validation_response_lists_details() {
        let response = ApiError::validation(vec!["x".into(), "y".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Validation failed");
        assert_eq!(json["details"], serde_json::json!(["x", "y"]));
    }

    #[tokio::test]
    async fn test_storage_response_has_no_details() {
        let response = ApiError::storage(DbErr::Custom("boom".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "A database error occurred"}));
    }

    #[test]
    fn test_init_error_messages() {
        let err = InitError::RegistryConflict {
            name: "User".into(),
            first: "a::Entity".into(),
            second: "b::Entity".into(),
        };
        assert_eq!(
            err.to_string(),
            "entity name 'User' is declared by both a::Entity and b::Entity"
        );
        let err: InitError = DescriptorError::MissingTable {
            entity: "Ghost".into(),
        }
        .into();
        assert!(matches!(err, InitError::Descriptor(_)));
    }
}
