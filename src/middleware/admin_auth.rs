//! Shared-token gate for the admin surface.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::store::AppState;

/// Header carrying the admin token, shared with the key-generation tool.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Compare a presented token against the configured one in constant time.
/// An unset token locks the surface entirely rather than opening it.
fn token_matches(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    // Length check is not constant-time, but the token length is deployment
    // configuration, not per-request secret state.
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !token_matches(provided, &state.admin_token) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
