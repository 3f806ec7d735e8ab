use std::sync::Arc;
use axum::{routing::get, Router, middleware};

use crate::app::AppState;
use crate::handlers::{diagnostics, health_check, ready_check};
use crate::routes::auth_middleware::auth_middleware;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    let protected = Router::<Arc<AppState>>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware)); // Applies to all routes added above

    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .merge(protected)
        .with_state(app_state)
}
