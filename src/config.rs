//! Configuration module for linkshare.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, ShareError};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which storage backend holds uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    /// Flat files under a local root directory.
    #[default]
    Local,
    /// S3-compatible bucket with presigned downloads.
    ObjectStore,
}

impl std::str::FromStr for StorageBackendKind {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "object_store" | "s3" => Ok(Self::ObjectStore),
            other => Err(ShareError::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage backend.
    #[serde(default)]
    pub backend: StorageBackendKind,
    /// Root directory for the local backend.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Lifetime of presigned download URLs in seconds.
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
}

fn default_storage_root() -> String {
    "data/uploads".to_string()
}

fn default_max_upload_size() -> u64 {
    200
}

fn default_signed_url_ttl() -> u64 {
    3600
}

/// Longest lifetime SigV4 accepts for a presigned URL (one week).
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            root: default_storage_root(),
            max_upload_size_mb: default_max_upload_size(),
            signed_url_ttl_secs: default_signed_url_ttl(),
        }
    }
}

/// S3-compatible object store configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObjectStoreConfig {
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Region (defaults to us-east-1 when unset).
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint, e.g. a MinIO host.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Access key ID. Falls back to the ambient AWS credential chain.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    #[serde(default)]
    pub force_path_style: bool,
}

/// Which catalog backend holds file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogBackendKind {
    /// Embedded SQLite database.
    #[default]
    Sqlite,
    /// MongoDB collection.
    Document,
}

impl std::str::FromStr for CatalogBackendKind {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "document" | "mongodb" => Ok(Self::Document),
            other => Err(ShareError::Config(format!("unknown catalog backend: {other}"))),
        }
    }
}

/// Catalog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Catalog backend.
    #[serde(default)]
    pub backend: CatalogBackendKind,
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// MongoDB connection string.
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    /// MongoDB database name.
    #[serde(default = "default_mongodb_database")]
    pub mongodb_database: String,
}

fn default_db_path() -> String {
    "data/files.db".to_string()
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongodb_database() -> String {
    "filesdb".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CatalogBackendKind::default(),
            path: default_db_path(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_database: default_mongodb_database(),
        }
    }
}

/// Web layer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Whether to serve the upload page.
    #[serde(default = "default_serve_static")]
    pub serve_static: bool,
    /// Path to static files directory.
    #[serde(default = "default_static_path")]
    pub static_path: String,
    /// Rate limit per client (requests per minute).
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_serve_static() -> bool {
    true
}

fn default_static_path() -> String {
    "public".to_string()
}

fn default_rate_limit() -> u32 {
    60
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            cors_origins: vec![],
            serve_static: default_serve_static(),
            static_path: default_static_path(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/linkshare.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Object store configuration.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// Catalog configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Web configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ShareError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ShareError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Empty variables are ignored. Numeric variables that fail to parse are
    /// reported as configuration errors.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(host) = env_var("LINKSHARE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }

        if let Some(backend) = env_var("LINKSHARE_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(root) = env_var("LINKSHARE_STORAGE_ROOT") {
            self.storage.root = root;
        }
        if let Some(size) = env_var("LINKSHARE_MAX_UPLOAD_SIZE_MB") {
            self.storage.max_upload_size_mb = parse_env("LINKSHARE_MAX_UPLOAD_SIZE_MB", &size)?;
        }
        if let Some(ttl) = env_var("LINKSHARE_SIGNED_URL_TTL_SECS") {
            self.storage.signed_url_ttl_secs = parse_env("LINKSHARE_SIGNED_URL_TTL_SECS", &ttl)?;
        }

        if let Some(bucket) = env_var("S3_BUCKET") {
            self.object_store.bucket = bucket;
        }
        if let Some(region) = env_var("AWS_REGION") {
            self.object_store.region = Some(region);
        }
        if let Some(endpoint) = env_var("S3_ENDPOINT") {
            self.object_store.endpoint = Some(endpoint);
        }
        if let Some(key_id) = env_var("AWS_ACCESS_KEY_ID") {
            self.object_store.access_key_id = Some(key_id);
        }
        if let Some(secret) = env_var("AWS_SECRET_ACCESS_KEY") {
            self.object_store.secret_access_key = Some(secret);
        }

        if let Some(backend) = env_var("LINKSHARE_CATALOG_BACKEND") {
            self.catalog.backend = backend.parse()?;
        }
        if let Some(path) = env_var("LINKSHARE_DATABASE_PATH") {
            self.catalog.path = path;
        }
        if let Some(uri) = env_var("MONGODB_URI") {
            self.catalog.mongodb_uri = uri;
        }
        if let Some(db) = env_var("MONGODB_DATABASE") {
            self.catalog.mongodb_database = db;
        }

        if let Some(limit) = env_var("LINKSHARE_RATE_LIMIT") {
            self.web.rate_limit_per_minute = parse_env("LINKSHARE_RATE_LIMIT", &limit)?;
        }
        if let Some(level) = env_var("LINKSHARE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.max_upload_size_mb == 0 {
            return Err(ShareError::Validation(
                "storage.max_upload_size_mb must be greater than 0".to_string(),
            ));
        }
        if self.storage.signed_url_ttl_secs == 0 {
            return Err(ShareError::Validation(
                "storage.signed_url_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.storage.signed_url_ttl_secs > MAX_SIGNED_URL_TTL_SECS {
            return Err(ShareError::Validation(format!(
                "storage.signed_url_ttl_secs must be at most {MAX_SIGNED_URL_TTL_SECS} (one week)"
            )));
        }
        if self.storage.backend == StorageBackendKind::ObjectStore {
            if self.object_store.bucket.is_empty() {
                return Err(ShareError::Validation(
                    "object store backend selected but object_store.bucket is not set. \
                     Set it in config.toml or via S3_BUCKET environment variable."
                        .to_string(),
                ));
            }
            if self.object_store.access_key_id.is_some()
                != self.object_store.secret_access_key.is_some()
            {
                return Err(ShareError::Validation(
                    "object_store requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ShareError::Config(format!("invalid value for {name}: {value}")))
}
