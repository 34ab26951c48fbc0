//! Response DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Share link returned after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LinkResponse {
    /// Relative link, e.g. `/file/Ab12Cd34Ef56`.
    #[schema(example = "/file/Ab12Cd34Ef56")]
    pub link: String,
}
