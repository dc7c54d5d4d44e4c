//! Error types for rabdap-id
//!
//! [`SyncError`] covers the directory client and the sync engine;
//! [`ApiError`] maps everything onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rabdap_common::IdField;
use serde_json::json;
use thiserror::Error;

/// Directory and synchronization errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Directory payload lacks one of the canonical attributes
    #[error("Directory entry {dn} is missing attribute {attribute}")]
    UnrecognizedAttribute { attribute: &'static str, dn: String },

    /// Bind, search or unbind failed at the transport level
    #[error("Directory connection error: {0}")]
    DirectoryConnection(String),

    #[error("Directory client is already open")]
    AlreadyOpen,

    #[error("Directory client is not open")]
    NotOpen,

    /// Cache miss that the directory could not resolve either
    #[error("No directory entry for {field}={value}")]
    NotInDirectory { field: IdField, value: String },

    /// Write-back of one refreshed record failed
    #[error("Failed to write record {key}: {reason}")]
    RecordWrite { key: String, reason: String },

    #[error(transparent)]
    Common(#[from] rabdap_common::Error),
}

/// Result type for directory and sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Common error: {0}")]
    Common(#[from] rabdap_common::Error),
}

fn common_status(err: &rabdap_common::Error) -> (StatusCode, &'static str) {
    use rabdap_common::Error;

    match err {
        Error::UnknownField(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_FIELD"),
        Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Sync(err) => match err {
                SyncError::NotInDirectory { .. } => (StatusCode::NOT_FOUND, "NOT_IN_DIRECTORY"),
                SyncError::DirectoryConnection(_) => {
                    (StatusCode::BAD_GATEWAY, "DIRECTORY_UNAVAILABLE")
                }
                SyncError::UnrecognizedAttribute { .. } => {
                    (StatusCode::BAD_GATEWAY, "DIRECTORY_PAYLOAD")
                }
                SyncError::Common(common) => common_status(common),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "SYNC_ERROR"),
            },
            ApiError::Common(common) => common_status(common),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, error = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
