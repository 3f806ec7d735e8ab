use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json};
use tracing::debug;

use crate::app::AppState;
use crate::models::{HealthResponse, ReadyResponse};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint: not ready once the hub is shutting down
pub async fn ready_check(State(app_state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    debug!("Readiness check requested");
    if app_state.hub.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "unavailable".to_string(),
                message: "Server is shutting down".to_string(),
                accepting_connections: false,
            }),
        );
    }
    (
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ok".to_string(),
            message: "Service is ready".to_string(),
            accepting_connections: true,
        }),
    )
}
