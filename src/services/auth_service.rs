use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header or auth_token cookie")]
    MissingToken,
    #[error("invalid {0} header")]
    InvalidHeader(&'static str),
    #[error("no JWT secret configured")]
    NotConfigured,
    #[error("JWT validation failed: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token has no 'sub' claim")]
    MissingSubject,
}

/// Identity carried by a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthClaims {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl AuthClaims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

// Get the auth token from request headers: Authorization first, then the auth_token cookie
pub fn get_auth_token(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidHeader("Authorization"))?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader("Cookie"))?;

    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" {
            return Ok(cookie.value().to_string());
        }
    }
    Err(AuthError::MissingToken)
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Validate `token` and extract the user id (`sub`) and `roles` claims.
pub fn authenticate(token: &str, secret: Option<&str>) -> Result<AuthClaims, AuthError> {
    let secret = secret.ok_or(AuthError::NotConfigured)?;
    let token_data = validate_jwt(token, secret)?;

    let user_id = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingSubject)?
        .to_string();

    let roles = match token_data.claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    };

    debug!(user = %user_id, "JWT token validated");
    Ok(AuthClaims { user_id, roles })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) fn make_token(secret: &str, sub: &str, roles: &[&str]) -> String {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let claims = serde_json::json!({ "sub": sub, "roles": roles, "exp": exp });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(http::header::COOKIE, HeaderValue::from_static("auth_token=xyz"));
        assert_eq!(get_auth_token(&headers).unwrap(), "abc");
    }

    #[test]
    fn cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=xyz"));
        assert_eq!(get_auth_token(&headers).unwrap(), "xyz");

        let empty = HeaderMap::new();
        assert!(matches!(get_auth_token(&empty), Err(AuthError::MissingToken)));
    }

    #[test]
    fn authenticate_reads_sub_and_roles() {
        let token = make_token("s3cret", "user-1", &["admin"]);
        let claims = authenticate(&token, Some("s3cret")).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert!(claims.has_role("admin"));
    }

    #[test]
    fn wrong_secret_or_missing_secret_fails() {
        let token = make_token("s3cret", "user-1", &[]);
        assert!(matches!(authenticate(&token, Some("other")), Err(AuthError::Invalid(_))));
        assert!(matches!(authenticate(&token, None), Err(AuthError::NotConfigured)));
    }
}
