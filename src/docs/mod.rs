use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service accepts connections", body = ReadyResponse),
        (status = 503, description = "Service is shutting down", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Hub and host diagnostics (requires the admin role)
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Join a live session over WebSocket
#[utoipa::path(
    get,
    path = "/ws",
    params(
        ("session_id" = String, Query, description = "Session to join"),
        ("token" = Option<String>, Query, description = "JWT; Authorization header and auth_token cookie are also accepted"),
        ("invite" = Option<String>, Query, description = "Invite token for new or anonymous participants"),
        ("display_name" = Option<String>, Query, description = "Display name for anonymous participants")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 400, description = "Missing session_id", body = ErrorResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 403, description = "Not allowed to join or origin rejected", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn websocket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        websocket_doc,
    ),
    components(
        schemas(HealthResponse, ReadyResponse, DiagnosticsResponse, ErrorResponse, Role, Tier)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
