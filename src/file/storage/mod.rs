//! Byte storage for uploaded files.
//!
//! Two backends implement [`StorageBackend`]:
//! - [`LocalStorage`]: flat files under a root directory, streamed back on
//!   retrieval
//! - [`ObjectStorage`]: an S3-compatible bucket, retrieved through presigned
//!   URLs
//!
//! Both name stored blobs `<epoch-ms>-<sanitized-name>`.

mod local;
mod object;

pub use local::LocalStorage;
pub use object::ObjectStorage;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;

use super::error::StorageResult;
use super::record::FileRecord;

/// Maximum length of the sanitized name part of a storage key.
pub const MAX_SANITIZED_NAME_LENGTH: usize = 100;

/// How many keys to try before giving up on a name clash.
pub(crate) const MAX_KEY_ATTEMPTS: u32 = 16;

/// Incoming upload body.
pub type UploadStream<'a> = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'a>>;

/// Outgoing file body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Locator to hand to the catalog.
    pub key: String,
    /// Number of bytes written.
    pub size_bytes: u64,
}

/// How stored bytes reach the client.
pub enum Fetched {
    /// Bytes streamed through this service.
    Stream {
        /// File content.
        body: ByteStream,
        /// Content length.
        size_bytes: u64,
    },
    /// A time-limited URL the client is redirected to.
    Redirect(String),
}

impl std::fmt::Debug for Fetched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fetched::Stream { size_bytes, .. } => f
                .debug_struct("Stream")
                .field("size_bytes", size_bytes)
                .finish_non_exhaustive(),
            Fetched::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
        }
    }
}

/// A place to persist uploaded bytes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist the stream under a freshly generated key.
    ///
    /// The returned key is only produced once every byte has been durably
    /// written; on any failure nothing is left behind.
    async fn write<'a>(
        &self,
        stream: UploadStream<'a>,
        declared_name: &str,
    ) -> StorageResult<StoredBlob>;

    /// Produce the bytes (or a URL to them) for a catalog record.
    ///
    /// Returns `StorageError::NotFound` when the bytes are gone.
    async fn fetch(&self, record: &FileRecord) -> StorageResult<Fetched>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Strip every character outside `[A-Za-z0-9._-]` from a client filename.
///
/// The result never contains a path separator, so it cannot escape the
/// storage root. Empty results fall back to `file`.
pub fn sanitize_name(declared_name: &str) -> String {
    let sanitized: String = declared_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_SANITIZED_NAME_LENGTH)
        .collect();

    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

/// Build a storage key of the form `<epoch-ms>-<sanitized-name>`.
pub fn generate_storage_key(now: DateTime<Utc>, declared_name: &str) -> String {
    format!("{}-{}", now.timestamp_millis(), sanitize_name(declared_name))
}

/// Check that a key is a single flat path component.
pub(crate) fn is_flat_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}

/// Build a safe `Content-Disposition` header value.
///
/// Control characters (including CR/LF) are removed to prevent header
/// injection; non-ASCII names are carried in an RFC 5987 `filename*`
/// parameter.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\')
    {
        return format!("{disposition}; filename=\"{filename}\"");
    }

    let fallback: String = sanitized
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    let encoded = urlencoding::encode(&sanitized);

    format!("{disposition}; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_name_keeps_safe_characters() {
        assert_eq!(sanitize_name("report-2024_v1.pdf"), "report-2024_v1.pdf");
    }

    #[test]
    fn test_sanitize_name_path_traversal() {
        let sanitized = sanitize_name("../../etc/passwd");
        assert_eq!(sanitized, "....etcpasswd");
        assert!(is_flat_key(&sanitized));
    }

    #[test]
    fn test_sanitize_name_windows_separators() {
        assert_eq!(sanitize_name("..\\..\\boot.ini"), "....boot.ini");
    }

    #[test]
    fn test_sanitize_name_strips_unicode_and_spaces() {
        assert_eq!(sanitize_name("my file (1).txt"), "myfile1.txt");
        assert_eq!(sanitize_name("日本語.txt"), ".txt");
    }

    #[test]
    fn test_sanitize_name_empty_fallback() {
        assert_eq!(sanitize_name(""), "file");
        assert_eq!(sanitize_name("///"), "file");
        assert_eq!(sanitize_name("日本語"), "file");
    }

    #[test]
    fn test_sanitize_name_truncates() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_name(&long).len(), MAX_SANITIZED_NAME_LENGTH);
    }

    #[test]
    fn test_generate_storage_key() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            generate_storage_key(now, "../../etc/passwd"),
            "1700000000123-....etcpasswd"
        );
        assert_eq!(generate_storage_key(now, "a b.txt"), "1700000000123-ab.txt");
    }

    #[test]
    fn test_is_flat_key() {
        assert!(is_flat_key("1700000000123-a.txt"));
        assert!(is_flat_key("1700000000123-.."));
        assert!(!is_flat_key(""));
        assert!(!is_flat_key(".."));
        assert!(!is_flat_key("a/b"));
        assert!(!is_flat_key("a\\b"));
    }

    #[test]
    fn test_content_disposition_simple_ascii() {
        assert_eq!(
            content_disposition("inline", "document.txt"),
            "inline; filename=\"document.txt\""
        );
    }

    #[test]
    fn test_content_disposition_unicode() {
        let result = content_disposition("inline", "日本語ファイル.txt");
        assert!(result.starts_with("inline; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E6%97%A5%E6%9C%AC%E8%AA%9E"));
        assert!(result.is_ascii());
    }

    #[test]
    fn test_content_disposition_double_quote() {
        let result = content_disposition("attachment", "test\"file.txt");
        assert!(result.contains("filename=\"test_file.txt\""));
        assert!(result.contains("filename*=UTF-8''"));
    }

    #[test]
    fn test_content_disposition_header_injection() {
        let result = content_disposition("inline", "file\"\r\nX-Evil: header\r\n\r\n<script>.txt");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("inline; filename="));
    }
}
