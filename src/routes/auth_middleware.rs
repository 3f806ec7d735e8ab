use std::sync::Arc;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use crate::app::AppState;
use crate::services::auth_service::{authenticate, get_auth_token, AuthError};

pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(req.headers()) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let claims = match authenticate(&token, app_state.config.auth_jwt_secret.as_deref()) {
        Ok(claims) => claims,
        Err(AuthError::NotConfigured) => {
            error!("Auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    debug!(user = %claims.user_id, "Request authenticated");

    // 3. Make the claims available to downstream handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
