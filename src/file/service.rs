//! Upload and retrieval pipeline.
//!
//! Upload: write bytes to storage, then mint a token and record it in the
//! catalog. Retrieval: look the token up and ask storage for the bytes or a
//! URL to them.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{error, info, warn};

use super::catalog::Catalog;
use super::error::{CatalogError, FileError, StorageError};
use super::record::FileRecord;
use super::storage::{Fetched, StorageBackend, UploadStream};
use super::token::{generate_token, is_valid_token};

/// How many tokens to try before giving up on a colliding catalog.
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Name recorded when the client declares none.
pub const DEFAULT_FILE_NAME: &str = "file";

/// MIME type used when neither the client nor the name says otherwise.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A looked-up file and how to deliver it.
#[derive(Debug)]
pub struct Retrieved {
    pub record: FileRecord,
    pub content: Fetched,
}

/// Coordinates a storage backend and a catalog.
#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn StorageBackend>,
    catalog: Arc<dyn Catalog>,
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileService")
            .field("storage", &self.storage.backend_name())
            .field("catalog", &self.catalog.backend_name())
            .finish()
    }
}

impl FileService {
    /// Create a new FileService.
    pub fn new(storage: Arc<dyn StorageBackend>, catalog: Arc<dyn Catalog>) -> Self {
        Self { storage, catalog }
    }

    /// Name of the storage backend in use.
    pub fn storage_backend(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// Name of the catalog backend in use.
    pub fn catalog_backend(&self) -> &'static str {
        self.catalog.backend_name()
    }

    /// Store an upload and record it under a fresh token.
    ///
    /// If the catalog insert ultimately fails the blob stays in storage; the
    /// failure is logged with its key.
    pub async fn upload(
        &self,
        declared_name: Option<&str>,
        declared_mime: Option<&str>,
        stream: UploadStream<'_>,
    ) -> Result<FileRecord, FileError> {
        let original_name = declared_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let mime_type = resolve_mime(&original_name, declared_mime);

        let blob = self
            .storage
            .write(stream, &original_name)
            .await
            .map_err(|e| match e {
                StorageError::SizeLimitExceeded { limit } => FileError::SizeLimitExceeded { limit },
                StorageError::Interrupted(msg) => FileError::UploadAborted(msg),
                other => {
                    error!(error = %other, backend = self.storage.backend_name(), "Storage write failed");
                    FileError::StorageWriteFailed(other.to_string())
                }
            })?;

        let mut record = FileRecord {
            token: String::new(),
            original_name,
            storage_key: blob.key,
            mime_type,
            size_bytes: i64::try_from(blob.size_bytes).unwrap_or(i64::MAX),
            // Millisecond precision survives every catalog unchanged
            created_at: Utc::now().trunc_subsecs(3),
        };

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            record.token = generate_token();
            match self.catalog.insert(&record).await {
                Ok(()) => {
                    info!(
                        token = %record.token,
                        key = %record.storage_key,
                        size = record.size_bytes,
                        "File uploaded"
                    );
                    return Ok(record);
                }
                Err(CatalogError::DuplicateToken(token)) => {
                    warn!(token = %token, attempt, "Token collision, regenerating");
                }
                Err(CatalogError::Unavailable(msg)) => {
                    error!(key = %record.storage_key, error = %msg, "Catalog insert failed, blob left in storage");
                    return Err(FileError::CatalogUnavailable(msg));
                }
            }
        }

        error!(
            key = %record.storage_key,
            attempts = MAX_TOKEN_ATTEMPTS,
            "No free token, blob left in storage"
        );
        Err(FileError::CatalogUnavailable(format!(
            "no unique token after {MAX_TOKEN_ATTEMPTS} attempts"
        )))
    }

    /// Resolve a token to its record and content.
    pub async fn retrieve(&self, token: &str) -> Result<Retrieved, FileError> {
        if !is_valid_token(token) {
            return Err(FileError::NotFound);
        }

        let record = self
            .catalog
            .find_by_token(token)
            .await
            .map_err(|e| {
                error!(error = %e, "Catalog lookup failed");
                FileError::CatalogUnavailable(e.to_string())
            })?
            .ok_or(FileError::NotFound)?;

        let content = self.storage.fetch(&record).await.map_err(|e| match e {
            StorageError::NotFound(key) => {
                warn!(token = %record.token, key = %key, "Catalog entry has no stored bytes");
                FileError::Gone
            }
            other => {
                error!(token = %record.token, error = %other, "Storage read failed");
                FileError::Storage(other.to_string())
            }
        })?;

        Ok(Retrieved { record, content })
    }
}

/// Pick the MIME type to record: the client's if usable, else a guess from
/// the name, else `application/octet-stream`.
///
/// Only a missing, blank or unparseable declaration is replaced; a declared
/// `application/octet-stream` is kept so opaque uploads are never served as
/// something a browser would render.
pub fn resolve_mime(name: &str, declared: Option<&str>) -> String {
    declared
        .map(str::trim)
        .filter(|m| !m.is_empty() && m.parse::<mime_guess::mime::Mime>().is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(name)
                .first_raw()
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string()
        })
}
