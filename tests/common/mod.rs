//! Test helpers for the HTTP API tests.
//!
//! Provides in-process servers over real local storage and SQLite, plus
//! in-memory fakes for the object store and a colliding catalog.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use bytes::Bytes;
use futures::StreamExt;
use tempfile::TempDir;

use linkshare::config::WebConfig;
use linkshare::db::Database;
use linkshare::file::{
    sanitize_name, Catalog, CatalogError, CatalogResult, Fetched, FileRecord,
    FileService, LocalStorage, SqliteCatalog, StorageBackend, StorageError, StorageResult,
    StoredBlob, UploadStream,
};
use linkshare::web::{create_router, AppState, RateLimitState};

/// Web configuration used by the tests: no static files, generous rate limit.
pub fn test_web_config() -> WebConfig {
    WebConfig {
        cors_origins: vec![],
        serve_static: false,
        static_path: "public".to_string(),
        rate_limit_per_minute: 10_000,
    }
}

/// Build a router around the given backends.
pub fn router_for(
    storage: Arc<dyn StorageBackend>,
    catalog: Arc<dyn Catalog>,
    max_upload_size: u64,
    config: &WebConfig,
) -> Router {
    let files = FileService::new(storage, catalog);
    let app_state = Arc::new(AppState::new(files, max_upload_size));
    let rate_limit = Arc::new(RateLimitState::new(config.rate_limit_per_minute));
    create_router(app_state, rate_limit, config)
}

/// A server over local storage and an in-memory SQLite catalog.
pub struct LocalHarness {
    pub server: TestServer,
    pub storage: LocalStorage,
    pub db: Database,
    pub dir: TempDir,
}

impl LocalHarness {
    /// Number of blobs currently stored.
    pub fn blob_count(&self) -> usize {
        std::fs::read_dir(self.storage.root()).unwrap().count()
    }

    /// Number of catalog records.
    pub async fn record_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }

    /// Look up a record straight from the catalog.
    pub async fn record(&self, token: &str) -> FileRecord {
        SqliteCatalog::new(self.db.pool().clone())
            .find_by_token(token)
            .await
            .unwrap()
            .expect("record should exist")
    }
}

/// Create a test server with local storage and an in-memory database.
pub async fn local_server(max_upload_size: u64) -> LocalHarness {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path().join("uploads"), max_upload_size)
        .await
        .unwrap();
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");

    let router = router_for(
        Arc::new(storage.clone()),
        Arc::new(SqliteCatalog::new(db.pool().clone())),
        max_upload_size,
        &test_web_config(),
    );
    let server = TestServer::new(router).expect("Failed to create test server");

    LocalHarness {
        server,
        storage,
        db,
        dir,
    }
}

/// Extract the token from a `/file/<token>` link.
pub fn token_of(link: &str) -> &str {
    link.strip_prefix("/file/").expect("link should start with /file/")
}

/// In-memory object store that signs a new URL on every fetch.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    written: AtomicUsize,
    signed: AtomicUsize,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many URLs have been signed so far.
    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    /// Delete an object behind the catalog's back.
    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl StorageBackend for FakeObjectStore {
    async fn write<'a>(
        &self,
        mut stream: UploadStream<'a>,
        declared_name: &str,
    ) -> StorageResult<StoredBlob> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Interrupted(e.to_string()))?;
            data.extend_from_slice(&chunk);
        }

        let seq = self.written.fetch_add(1, Ordering::SeqCst);
        let key = format!("{seq}-{}", sanitize_name(declared_name));
        let size_bytes = data.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), Bytes::from(data));
        Ok(StoredBlob { key, size_bytes })
    }

    async fn fetch(&self, record: &FileRecord) -> StorageResult<Fetched> {
        if !self.objects.lock().unwrap().contains_key(&record.storage_key) {
            return Err(StorageError::NotFound(record.storage_key.clone()));
        }
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Fetched::Redirect(format!(
            "https://objects.example.com/bucket/{}?X-Amz-Expires=3600&X-Amz-Signature=sig{n}",
            record.storage_key
        )))
    }

    fn backend_name(&self) -> &'static str {
        "fake_object_store"
    }
}

/// Catalog wrapper that reports a token collision a fixed number of times
/// before delegating.
pub struct CollidingCatalog<C> {
    inner: C,
    collisions: usize,
    attempts: AtomicUsize,
}

impl<C: Catalog> CollidingCatalog<C> {
    pub fn new(inner: C, collisions: usize) -> Self {
        Self {
            inner,
            collisions,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Insert attempts seen so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: Catalog> Catalog for CollidingCatalog<C> {
    async fn insert(&self, record: &FileRecord) -> CatalogResult<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.collisions {
            return Err(CatalogError::DuplicateToken(record.token.clone()));
        }
        self.inner.insert(record).await
    }

    async fn find_by_token(&self, token: &str) -> CatalogResult<Option<FileRecord>> {
        self.inner.find_by_token(token).await
    }

    fn backend_name(&self) -> &'static str {
        "colliding"
    }
}
