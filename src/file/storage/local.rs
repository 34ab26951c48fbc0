//! Local filesystem storage.
//!
//! Files are stored flat under the root directory:
//! ```text
//! {root}/
//! ├── 1700000000123-report.pdf
//! ├── 1700000000456-notes.txt
//! └── ...
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};

use super::{
    generate_storage_key, is_flat_key, ByteStream, Fetched, StorageBackend, StoredBlob,
    UploadStream, MAX_KEY_ATTEMPTS,
};
use crate::file::error::{StorageError, StorageResult};
use crate::file::record::FileRecord;

/// Filesystem-backed storage that streams files back through the service.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    max_size: u64,
}

impl LocalStorage {
    /// Create a storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>, max_size: u64) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, max_size })
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Largest accepted upload in bytes.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Resolve a key to its path under the root.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if !is_flat_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Whether a blob exists for `key`.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    /// Open a stored blob for streaming.
    pub async fn read(&self, key: &str) -> StorageResult<(ByteStream, u64)> {
        let path = self.path_for(key)?;
        let file = fs::File::open(&path).await.map_err(|e| not_found_or_io(e, key))?;
        let size = file.metadata().await?.len();
        Ok((Box::pin(ReaderStream::new(file)), size))
    }

    /// Create a new, empty file under a key nobody else holds.
    ///
    /// Two uploads of the same name in the same millisecond would share a
    /// key, so the loser moves on to the next millisecond.
    async fn create_unique(&self, declared_name: &str) -> StorageResult<(String, PathBuf, fs::File)> {
        let base = Utc::now();

        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key = generate_storage_key(base + Duration::milliseconds(i64::from(attempt)), declared_name);
            let path = self.path_for(&key)?;

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((key, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(key = %key, "Storage key taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StorageError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free storage key after {MAX_KEY_ATTEMPTS} attempts"),
        )))
    }
}

/// Removes a partially written file unless the write completed.
///
/// Also covers the write future being dropped mid-stream, which is what
/// happens when the client disconnects.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?path, error = %e, "Failed to remove partial upload");
                }
            }
        }
    }
}

fn not_found_or_io(e: io::Error, key: &str) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self, stream), fields(backend = "local"))]
    async fn write<'a>(
        &self,
        mut stream: UploadStream<'a>,
        declared_name: &str,
    ) -> StorageResult<StoredBlob> {
        let (key, path, mut file) = self.create_unique(declared_name).await?;
        let partial = PartialFile::new(path);

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Interrupted(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    limit: self.max_size,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        partial.keep();

        debug!(key = %key, size = written, "Stored file");
        Ok(StoredBlob {
            key,
            size_bytes: written,
        })
    }

    #[instrument(skip(self, record), fields(backend = "local", key = %record.storage_key))]
    async fn fetch(&self, record: &FileRecord) -> StorageResult<Fetched> {
        let (body, size_bytes) = self.read(&record.storage_key).await?;
        Ok(Fetched::Stream { body, size_bytes })
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
