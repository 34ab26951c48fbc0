//! File record catalogs.
//!
//! A catalog maps public tokens to [`FileRecord`]s. Token uniqueness is
//! enforced by the catalog itself (a unique index), so concurrent uploads
//! racing on the same token see [`CatalogError::DuplicateToken`] instead of
//! silently overwriting each other.

mod document;
mod sqlite;

pub use document::{DocumentCatalog, FileDocument};
pub use sqlite::SqliteCatalog;

use async_trait::async_trait;

use super::error::CatalogResult;
use super::record::FileRecord;

#[cfg(doc)]
use super::error::CatalogError;

/// Persistent token to record mapping.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert a new record.
    ///
    /// Fails with `CatalogError::DuplicateToken` if the token is taken.
    async fn insert(&self, record: &FileRecord) -> CatalogResult<()>;

    /// Look up a record by token.
    async fn find_by_token(&self, token: &str) -> CatalogResult<Option<FileRecord>>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
