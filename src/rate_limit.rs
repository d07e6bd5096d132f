//! Per-client admission control for the public verify endpoint.
//!
//! Sliding window per client identifier: the first `x-forwarded-for` entry
//! when present, else the connection peer address. Best-effort and
//! in-process only - state resets on restart, and no cross-process
//! coordination is attempted. License verification is a low-value target,
//! so this is load shedding, not DoS defense.
//!
//! Configure via environment variables:
//! - RATE_LIMIT_MAX (default: 15)
//! - RATE_LIMIT_WINDOW_SECS (default: 60)

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::store::AppState;

/// Default maximum requests per identifier per window.
pub const DEFAULT_RATE_MAX: usize = 15;

/// Default window length in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: i64 = 60;

/// Sliding-window rate limiter over a shared identifier → timestamps map.
///
/// Rejected attempts are not recorded, so a client hammering the endpoint
/// past the limit does not push its own window further out.
pub struct SlidingWindowLimiter {
    max: usize,
    window_secs: i64,
    hits: Mutex<HashMap<String, Vec<i64>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max: usize, window_secs: i64) -> Self {
        Self {
            max,
            window_secs,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Admission check at the current wall-clock time.
    pub fn try_acquire(&self, identifier: &str) -> bool {
        self.try_acquire_at(identifier, Utc::now().timestamp())
    }

    /// Admission check at an explicit timestamp. Prunes entries older than
    /// the window, rejects without recording when the window is full,
    /// otherwise records the hit and admits.
    pub fn try_acquire_at(&self, identifier: &str, now: i64) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let timestamps = hits.entry(identifier.to_string()).or_default();
        timestamps.retain(|&t| now - t < self.window_secs);
        if timestamps.len() >= self.max {
            return false;
        }
        timestamps.push(now);
        true
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_MAX, DEFAULT_RATE_WINDOW_SECS)
    }
}

/// Derive the client identifier for rate limiting: first `x-forwarded-for`
/// entry (the service runs behind a proxy in production), then the direct
/// peer address, then a shared bucket for connections with neither.
pub fn client_identifier(headers: &HeaderMap, peer: Option<&SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admission middleware for rate-limited routes. Rejects with 429 before
/// the handler (and the store) is ever touched.
pub async fn admission_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let identifier = client_identifier(request.headers(), peer.as_ref());

    if !state.rate_limiter.try_acquire(&identifier) {
        tracing::debug!(client = %identifier, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Too many requests. Try again later." })),
        )
            .into_response();
    }

    next.run(request).await
}
