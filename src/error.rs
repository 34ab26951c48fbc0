//! Error types for linkshare.

use thiserror::Error;

/// Common error type for linkshare.
#[derive(Error, Debug)]
pub enum ShareError {
    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for configuration or input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend could not be initialized.
    #[error("storage error: {0}")]
    Storage(#[from] crate::file::StorageError),

    /// Catalog backend could not be initialized.
    #[error("catalog error: {0}")]
    Catalog(#[from] crate::file::CatalogError),
}

impl From<sqlx::Error> for ShareError {
    fn from(e: sqlx::Error) -> Self {
        ShareError::Database(e.to_string())
    }
}

/// Result type alias for linkshare operations.
pub type Result<T> = std::result::Result<T, ShareError>;
