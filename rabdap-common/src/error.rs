//! Common error types for RABDAP

use thiserror::Error;

/// Common result type for RABDAP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the RABDAP crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Logical identity field name outside the fixed field table
    #[error("Unknown identity field: {0}")]
    UnknownField(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
