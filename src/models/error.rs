use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every HTTP error, including refused WebSocket upgrades
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.into(),
        }
    }
}
