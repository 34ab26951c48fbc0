//! Web server for linkshare.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::{CatalogBackendKind, Config, StorageBackendKind, WebConfig};
use crate::db::Database;
use crate::file::{
    Catalog, DocumentCatalog, FileService, LocalStorage, ObjectStorage, SqliteCatalog,
    StorageBackend,
};
use crate::{Result, ShareError};

use super::handlers::AppState;
use super::middleware::RateLimitState;
use super::router::create_router;

/// Build the storage backend and catalog selected in the configuration.
pub async fn build_service(config: &Config) -> Result<FileService> {
    let max_size = config.storage.max_upload_size_bytes();

    let storage: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageBackendKind::Local => {
            let storage = LocalStorage::new(&config.storage.root, max_size).await?;
            tracing::info!("Local storage initialized at: {}", config.storage.root);
            Arc::new(storage)
        }
        StorageBackendKind::ObjectStore => {
            let storage = ObjectStorage::new(
                &config.object_store,
                max_size,
                Duration::from_secs(config.storage.signed_url_ttl_secs),
            )
            .await?;
            tracing::info!("Object storage initialized for bucket: {}", storage.bucket());
            Arc::new(storage)
        }
    };

    let catalog: Arc<dyn Catalog> = match config.catalog.backend {
        CatalogBackendKind::Sqlite => {
            let db = Database::open(&config.catalog.path).await?;
            Arc::new(SqliteCatalog::new(db.pool().clone()))
        }
        CatalogBackendKind::Document => Arc::new(
            DocumentCatalog::connect(&config.catalog.mongodb_uri, &config.catalog.mongodb_database)
                .await?,
        ),
    };

    Ok(FileService::new(storage, catalog))
}

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Rate limiter shared by all file routes.
    rate_limit: Arc<RateLimitState>,
    /// Web configuration.
    web_config: WebConfig,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, files: FileService) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| ShareError::Config(format!("invalid server address: {e}")))?;

        let app_state = AppState::new(files, config.storage.max_upload_size_bytes());

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            rate_limit: Arc::new(RateLimitState::new(config.web.rate_limit_per_minute)),
            web_config: config.web.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_router(self) -> axum::Router {
        create_router(self.app_state, self.rate_limit, &self.web_config)
            .layer(CompressionLayer::new())
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        self.rate_limit.clone().start_cleanup_task();
        let router = self.into_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        self.rate_limit.clone().start_cleanup_task();
        let router = self.into_router();

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
