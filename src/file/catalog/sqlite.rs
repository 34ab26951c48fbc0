//! SQLite catalog.

use async_trait::async_trait;
use tracing::instrument;

use super::Catalog;
use crate::db::DbPool;
use crate::file::error::{CatalogError, CatalogResult};
use crate::file::record::FileRecord;

/// Catalog stored in the embedded SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    /// Create a catalog over an already migrated pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    #[instrument(skip(self, record), fields(catalog = "sqlite", token = %record.token))]
    async fn insert(&self, record: &FileRecord) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO files (token, original_name, storage_key, mime_type, size_bytes, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.token)
        .bind(&record.original_name)
        .bind(&record.storage_key)
        .bind(&record.mime_type)
        .bind(record.size_bytes)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CatalogError::DuplicateToken(record.token.clone())
            }
            _ => CatalogError::from(e),
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(catalog = "sqlite"))]
    async fn find_by_token(&self, token: &str) -> CatalogResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            "SELECT token, original_name, storage_key, mime_type, size_bytes, created_at
             FROM files WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
