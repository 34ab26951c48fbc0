//! The catalog entry describing one stored file.

use chrono::{DateTime, Utc};

/// Metadata for a shared file.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileRecord {
    /// Public share token.
    pub token: String,
    /// Client-supplied filename, for display only.
    pub original_name: String,
    /// Backend locator (file name or object key).
    pub storage_key: String,
    /// Client-declared content type.
    pub mime_type: String,
    /// Number of bytes stored.
    pub size_bytes: i64,
    /// When the file was uploaded.
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// Public link path for this record.
    pub fn link(&self) -> String {
        link_for(&self.token)
    }
}

/// Public link path for a token.
pub fn link_for(token: &str) -> String {
    format!("/file/{token}")
}
