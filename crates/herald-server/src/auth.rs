use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

/// The token every protected route expects in `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct ApiToken(Arc<str>);

impl ApiToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }
}

/// Reject requests without the configured bearer token with 401.
pub async fn require_bearer(
    State(token): State<ApiToken>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    validate_bearer(req.headers(), &token.0).map_err(ApiError::Unauthorized)?;
    Ok(next.run(req).await)
}

fn validate_bearer(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| "Authorization header required".to_string())?
        .to_str()
        .map_err(|_| "Invalid authorization format".to_string())?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Invalid authorization format".to_string())?;

    if token != expected {
        return Err("Invalid token".to_string());
    }
    Ok(())
}
