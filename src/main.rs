use tracing::{error, info};

use linkshare::{build_service, Config, WebServer};

/// Path of the configuration file, overridable with `LINKSHARE_CONFIG`.
fn config_path() -> String {
    std::env::var("LINKSHARE_CONFIG").unwrap_or_else(|_| "config.toml".to_string())
}

#[tokio::main]
async fn main() {
    // Load configuration
    let path = config_path();
    let mut config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    if let Err(e) = config.apply_env_overrides().and_then(|_| config.validate()) {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = linkshare::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        linkshare::logging::init_console_only(&config.logging.level);
    }

    info!("linkshare - file sharing service");
    info!(
        storage = ?config.storage.backend,
        catalog = ?config.catalog.backend,
        max_upload_mb = config.storage.max_upload_size_mb,
        "Backends configured"
    );

    let files = match build_service(&config).await {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to initialize backends: {}", e);
            std::process::exit(1);
        }
    };

    let server = match WebServer::new(&config, files) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create web server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
