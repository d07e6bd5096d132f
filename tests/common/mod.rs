//! Test utilities and fixtures for keywarden integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub use keywarden::crypto;
pub use keywarden::handlers;
pub use keywarden::models::*;
pub use keywarden::rate_limit::SlidingWindowLimiter;
pub use keywarden::store::{AppState, FileStore, LicenseStore, SqliteStore};
pub use keywarden::verify;

/// Shared HMAC secret for tests (stands in for LICENSE_SECRET).
pub const TEST_SECRET: &[u8] = b"test-license-secret";

/// Admin token used by test fixtures (stands in for ADMIN_TOKEN).
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Build a correctly signed key for a hardware id under [`TEST_SECRET`].
pub fn signed_key(random: &str, hwid: &str) -> String {
    crypto::build_key(random, &crypto::expected_signature(random, hwid, TEST_SECRET))
}

/// Fresh in-memory SQLite store.
pub fn sqlite_store() -> SqliteStore {
    SqliteStore::open_in_memory().expect("Failed to open in-memory store")
}

/// AppState with an in-memory store and a limiter generous enough that
/// ordinary tests never trip it.
pub fn test_state() -> AppState {
    state_with_limiter(SlidingWindowLimiter::new(10_000, 60))
}

pub fn state_with_limiter(limiter: SlidingWindowLimiter) -> AppState {
    AppState {
        store: Arc::new(sqlite_store()),
        license_secret: Arc::new(TEST_SECRET.to_vec()),
        admin_token: Arc::new(TEST_ADMIN_TOKEN.to_string()),
        rate_limiter: Arc::new(limiter),
        allow_self_register: false,
    }
}

/// Full application router, wired the way main() wires it.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public::router(state.clone()))
        .merge(handlers::admin::router(state.clone()))
        .with_state(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should not fail at the transport level");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response should be valid JSON")
    };
    (status, json)
}

/// POST a JSON body to a public endpoint.
pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a JSON body with the test admin token attached.
pub async fn admin_post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-admin-token", TEST_ADMIN_TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// GET with the test admin token attached.
pub async fn admin_get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-admin-token", TEST_ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// GET without any auth.
pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// POST /verify with an x-forwarded-for header, for rate-limit tests.
pub async fn post_verify_from(
    app: &Router,
    client: &str,
    body: Value,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}
