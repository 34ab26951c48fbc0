//! API handlers.

pub mod file;

pub use file::*;

use crate::file::FileService;

/// Application state shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Upload and retrieval pipeline.
    pub files: FileService,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(files: FileService, max_upload_size: u64) -> Self {
        Self {
            files,
            max_upload_size,
        }
    }
}
