//! Document-store catalog backed by MongoDB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::Catalog;
use crate::file::error::{CatalogError, CatalogResult};
use crate::file::record::FileRecord;

const COLLECTION_NAME: &str = "files";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Stored shape of a file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDocument {
    pub token: String,
    pub original_name: String,
    pub storage_key: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: bson::DateTime,
}

impl From<&FileRecord> for FileDocument {
    fn from(record: &FileRecord) -> Self {
        Self {
            token: record.token.clone(),
            original_name: record.original_name.clone(),
            storage_key: record.storage_key.clone(),
            mime_type: record.mime_type.clone(),
            size_bytes: record.size_bytes,
            created_at: bson::DateTime::from_millis(record.created_at.timestamp_millis()),
        }
    }
}

impl From<FileDocument> for FileRecord {
    fn from(doc: FileDocument) -> Self {
        Self {
            token: doc.token,
            original_name: doc.original_name,
            storage_key: doc.storage_key,
            mime_type: doc.mime_type,
            size_bytes: doc.size_bytes,
            created_at: DateTime::<Utc>::from_timestamp_millis(doc.created_at.timestamp_millis())
                .unwrap_or_default(),
        }
    }
}

/// Catalog stored in a MongoDB collection with a unique index on `token`.
#[derive(Debug, Clone)]
pub struct DocumentCatalog {
    files: Collection<FileDocument>,
}

impl DocumentCatalog {
    /// Connect to `uri`, select `database`, and make sure the token index exists.
    pub async fn connect(uri: &str, database: &str) -> CatalogResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(unavailable)?;
        let files = client
            .database(database)
            .collection::<FileDocument>(COLLECTION_NAME);

        let catalog = Self { files };
        catalog.ensure_indexes().await?;
        info!(database = %database, "Connected to document catalog");
        Ok(catalog)
    }

    async fn ensure_indexes(&self) -> CatalogResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "token": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.files.create_index(index).await.map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: mongodb::error::Error) -> CatalogError {
    CatalogError::Unavailable(err.to_string())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

#[async_trait]
impl Catalog for DocumentCatalog {
    #[instrument(skip(self, record), fields(catalog = "document", token = %record.token))]
    async fn insert(&self, record: &FileRecord) -> CatalogResult<()> {
        match self.files.insert_one(FileDocument::from(record)).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(CatalogError::DuplicateToken(record.token.clone())),
            Err(e) => Err(unavailable(e)),
        }
    }

    #[instrument(skip(self), fields(catalog = "document"))]
    async fn find_by_token(&self, token: &str) -> CatalogResult<Option<FileRecord>> {
        let found = self
            .files
            .find_one(doc! { "token": token })
            .await
            .map_err(unavailable)?;
        Ok(found.map(FileRecord::from))
    }

    fn backend_name(&self) -> &'static str {
        "document"
    }
}
