//! File handlers.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;

use crate::file::{content_disposition, FileError, Fetched, UploadStream, DEFAULT_MIME_TYPE};
use crate::web::dto::LinkResponse;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// POST /upload - Store a file and return its share link.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "files",
    request_body(content = crate::web::dto::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = LinkResponse),
        (status = 400, description = "No file part, or file too large", body = crate::web::error::ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = crate::web::error::ErrorBody),
        (status = 500, description = "Storage or catalog failure", body = crate::web::error::ErrorBody)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!("Rejected multipart request: {}", e);
        ApiError::from(FileError::NoFile)
    })?;

    loop {
        let field = multipart.next_field().await.map_err(|e| {
            tracing::debug!("Failed to read multipart field: {}", e);
            ApiError::from(FileError::NoFile)
        })?;
        let Some(field) = field else {
            return Err(FileError::NoFile.into());
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let stream: UploadStream<'_> =
            Box::pin(field.map_err(|e| std::io::Error::other(e.to_string())));

        let record = state
            .files
            .upload(file_name.as_deref(), content_type.as_deref(), stream)
            .await
            .map_err(|e| {
                if e.is_client_error() {
                    tracing::info!("Upload rejected: {}", e);
                }
                ApiError::from(e)
            })?;

        return Ok(Json(LinkResponse {
            link: record.link(),
        }));
    }
}

/// GET /file/:token - Download a shared file.
///
/// Local storage streams the bytes; object storage answers with a redirect
/// to a freshly signed URL.
#[utoipa::path(
    get,
    path = "/file/{token}",
    tag = "files",
    params(
        ("token" = String, Path, description = "Share token")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 302, description = "Redirect to a presigned download URL"),
        (status = 404, description = "Unknown token", body = crate::web::error::ErrorBody),
        (status = 410, description = "File bytes no longer exist", body = crate::web::error::ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = crate::web::error::ErrorBody)
    )
)]
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let retrieved = state.files.retrieve(&token).await?;
    let record = retrieved.record;

    match retrieved.content {
        Fetched::Stream { body, size_bytes } => {
            let content_type = HeaderValue::from_str(&record.mime_type)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, size_bytes)
                .header(
                    header::CONTENT_DISPOSITION,
                    content_disposition("inline", &record.original_name),
                )
                .body(Body::from_stream(body))
                .map_err(|e| {
                    tracing::error!("Failed to build response: {}", e);
                    ApiError::internal("Failed to build response")
                })
        }
        Fetched::Redirect(url) => {
            let location = HeaderValue::from_str(&url).map_err(|e| {
                tracing::error!("Invalid signed URL: {}", e);
                ApiError::internal("Failed to sign download URL")
            })?;
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
    }
}
