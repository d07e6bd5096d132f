//! Public endpoints: health and license verification.
//!
//! Called by every installed client on startup and every ten minutes after.
//! Business rejections are 200 with `valid:false` - the body carries the
//! verdict, HTTP status does not.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::extractors::Json;
use crate::rate_limit;
use crate::store::AppState;
use crate::verify::{self, VerificationResult, REASON_MISSING_FIELDS};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub hwid: String,
}

pub async fn verify_license(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, Json<VerificationResult>) {
    let result = verify::verify_key(
        state.store.as_ref(),
        &state.license_secret,
        state.allow_self_register,
        &req.key,
        &req.hwid,
    );

    // Missing fields are a malformed request, not a business verdict; the
    // body still carries the reason so clients surface something useful.
    let status = if result.reason == REASON_MISSING_FIELDS {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };

    (status, Json(result))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    time: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    })
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/verify",
            post(verify_license).route_layer(axum::middleware::from_fn_with_state(
                state,
                rate_limit::admission_middleware,
            )),
        )
        .route("/health", get(health))
}
