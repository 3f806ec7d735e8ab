use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness probe body
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    /// Crate version of the running build
    pub version: String,
}
