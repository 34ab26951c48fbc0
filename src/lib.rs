//! linkshare - minimal file sharing service
//!
//! Upload a file with `POST /upload`, get back a short link, and fetch it
//! later with `GET /file/<token>`. Bytes live on the local filesystem or in
//! an S3-compatible bucket; token records live in SQLite or MongoDB.

pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use config::Config;
pub use db::Database;
pub use error::{Result, ShareError};
pub use file::{FileError, FileRecord, FileService};
pub use web::{build_service, WebServer};
