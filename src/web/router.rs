//! Router configuration for the Web API.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::dto::{LinkResponse, UploadForm};
use super::error::{ApiError, ErrorBody, ErrorCode, ErrorDetail};
use super::handlers::{self, get_file, upload_file, AppState};
use super::middleware::{create_cors_layer, rate_limit, security_headers, RateLimitState};
use crate::config::WebConfig;

/// Room for multipart boundaries and part headers on top of the file itself.
///
/// The file size limit proper is enforced while streaming to storage.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// OpenAPI document for the public API.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::file::upload_file, handlers::file::get_file, health_check),
    components(schemas(LinkResponse, UploadForm, ErrorBody, ErrorDetail, ErrorCode)),
    tags((name = "files", description = "Upload and share files"))
)]
pub struct ApiDoc;

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    rate_limit_state: Arc<RateLimitState>,
    config: &WebConfig,
) -> Router {
    let body_limit = usize::try_from(app_state.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/file/:token", get(get_file))
        .layer(middleware::from_fn(move |req, next| {
            let state = rate_limit_state.clone();
            rate_limit(state, req, next)
        }))
        .with_state(app_state);

    let router = Router::new()
        .merge(file_routes)
        .merge(create_health_router())
        .merge(create_openapi_router());

    let router = if config.serve_static {
        router.fallback_service(
            ServeDir::new(&config.static_path).not_found_service(not_found.into_service()),
        )
    } else {
        router.fallback(not_found)
    };

    router.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http())
            .layer(create_cors_layer(&config.cors_origins))
            .layer(middleware::from_fn(security_headers)),
    )
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Router serving the OpenAPI document.
pub fn create_openapi_router() -> Router {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

/// GET /health - Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "files",
    responses((status = 200, description = "Service is up", body = String))
)]
async fn health_check() -> &'static str {
    "OK"
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::internal("An internal error occurred").into_response()
}
