//! File sharing core.
//!
//! This module provides:
//! - Share token generation
//! - Byte storage (local filesystem or S3-compatible object store)
//! - File record catalogs (SQLite or MongoDB)
//! - The upload/retrieval pipeline tying them together

pub mod catalog;
mod error;
mod record;
mod service;
pub mod storage;
mod token;

pub use catalog::{Catalog, DocumentCatalog, FileDocument, SqliteCatalog};
pub use error::{
    CatalogError, CatalogResult, FileError, StorageError, StorageResult,
};
pub use record::{link_for, FileRecord};
pub use service::{
    resolve_mime, FileService, Retrieved, DEFAULT_FILE_NAME, DEFAULT_MIME_TYPE,
    MAX_TOKEN_ATTEMPTS,
};
pub use storage::{
    content_disposition, sanitize_name, ByteStream, Fetched, LocalStorage, ObjectStorage,
    StorageBackend, StoredBlob, UploadStream,
};
pub use token::{generate_token, is_valid_token, TOKEN_LENGTH};
