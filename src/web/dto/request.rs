//! Request DTOs.

use utoipa::ToSchema;

/// Multipart body of `POST /upload`.
///
/// Only used to describe the form in the OpenAPI document; the handler
/// streams the `file` part directly.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// The file to share.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
