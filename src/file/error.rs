//! Error types for the storage, catalog and upload/retrieval layers.

use thiserror::Error;

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("upload exceeds the {limit} byte limit")]
    SizeLimitExceeded { limit: u64 },

    #[error("upload stream interrupted: {0}")]
    Interrupted(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Another record already uses this token.
    #[error("duplicate token: {0}")]
    DuplicateToken(String),

    /// The catalog could not be reached or rejected the operation.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::Unavailable(e.to_string())
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Failures of the upload and retrieval pipeline.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("no file was uploaded")]
    NoFile,

    #[error("file too large (max {limit} bytes)")]
    SizeLimitExceeded { limit: u64 },

    #[error("upload aborted: {0}")]
    UploadAborted(String),

    #[error("failed to store file: {0}")]
    StorageWriteFailed(String),

    #[error("failed to record file: {0}")]
    CatalogUnavailable(String),

    #[error("file not found")]
    NotFound,

    #[error("file is no longer available")]
    Gone,

    #[error("failed to read file: {0}")]
    Storage(String),
}

impl FileError {
    /// Whether the failure was caused by the client rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FileError::NoFile
                | FileError::SizeLimitExceeded { .. }
                | FileError::UploadAborted(_)
                | FileError::NotFound
                | FileError::Gone
        )
    }
}
