//! Web API module for linkshare.
//!
//! Exposes `POST /upload` and `GET /file/:token`, plus a health check, the
//! OpenAPI document and an optional static upload page.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use middleware::RateLimitState;
pub use router::{create_router, ApiDoc};
pub use server::{build_service, WebServer};
