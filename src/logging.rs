//! Logging setup.
//!
//! Lines go to stdout and, unless `logging.file` is blank, are appended to a
//! log file that survives restarts. `RUST_LOG` takes over the per-crate
//! directives when set.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{Result, ShareError};

/// Dependencies that are noisy at info level: sqlx logs every statement and
/// the AWS SDK logs each credential lookup.
const QUIET_TARGETS: &[&str] = &[
    "sqlx=warn",
    "aws_config=warn",
    "aws_smithy_runtime=warn",
    "mongodb=warn",
    "hyper=warn",
];

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Filter with `level` as the default and either the caller's directives
/// (normally `RUST_LOG`) or [`QUIET_TARGETS`] on top.
fn build_filter(level: Level, directives: Option<String>) -> EnvFilter {
    let directives = directives
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| QUIET_TARGETS.join(","));
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}

fn env_directives() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV).ok()
}

/// Open the log file for appending, creating its directory first.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Initialize logging from the configuration.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(parse_level(&config.level), env_directives());

    let file_layer = if config.file.trim().is_empty() {
        None
    } else {
        let log_file = Arc::new(open_log_file(Path::new(&config.file))?);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(true),
        )
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(false)
                .with_target(true),
        )
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| ShareError::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

/// Console-only logging, used when the log file cannot be opened.
pub fn init_console_only(level: &str) {
    let filter = build_filter(parse_level(level), env_directives());

    // init() may have installed a subscriber before failing.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(true),
        )
        .with(filter)
        .try_init();
}
