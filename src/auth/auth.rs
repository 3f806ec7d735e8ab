use axum::{http::StatusCode, Json};

use crate::models::ErrorResponse;
use crate::services::auth_service::AuthClaims;

const ADMIN_ROLE: &str = "admin";

pub fn is_admin(claims: &AuthClaims) -> bool {
    claims.has_role(ADMIN_ROLE)
}

pub fn ensure_admin(claims: &AuthClaims) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_admin(claims) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse::new(status, "Admin access required"))))
}
