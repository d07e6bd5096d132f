//! Administrative endpoints, guarded by the shared admin token.
//!
//! Every mutation except create is idempotent: re-banning updates the
//! existing record, unbanning or deleting something absent is a no-op
//! success. Admin tooling retries on timeout without checking prior state.

use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::middleware::admin_auth;
use crate::store::{AppState, StoreDump};

/// Default ban/deactivation reason when the operator gives none.
pub const DEFAULT_REASON: &str = "no reason given";

fn default_reason() -> String {
    DEFAULT_REASON.to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub hwid: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonedKeyRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_reason")]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub ok: bool,
    pub key: String,
}

/// Normalize an admin-supplied key, rejecting empty input. Admin paths
/// accept any key shape - bans must be able to target keys that no longer
/// parse (or never did).
fn require_key(raw: &str) -> Result<String> {
    let key = crypto::normalize(raw);
    if key.is_empty() {
        return Err(AppError::BadRequest("Missing key".into()));
    }
    Ok(key)
}

fn trimmed_reason(reason: &str) -> String {
    let reason = reason.trim();
    if reason.is_empty() {
        DEFAULT_REASON.to_string()
    } else {
        reason.to_string()
    }
}

/// GET /admin/keys - dump of all three record sets for the dashboard.
pub async fn list_keys(State(state): State<AppState>) -> Result<Json<StoreDump>> {
    Ok(Json(state.store.list_all()?))
}

/// POST /admin/keys/create - register a key the key generator issued.
pub async fn create_key(
    State(state): State<AppState>,
    Json(req): Json<CreateKeyRequest>,
) -> Result<Json<CreatedResponse>> {
    let key = require_key(&req.key)?;
    let hwid = crypto::normalize(&req.hwid);
    if hwid.is_empty() {
        return Err(AppError::BadRequest("Missing hwid".into()));
    }

    // AlreadyExists surfaces as 409 via the error mapping.
    state
        .store
        .create_issued(&key, &hwid, Utc::now().timestamp())?;

    tracing::info!(key = %key, hwid = %hwid, "license key registered");
    Ok(Json(CreatedResponse { ok: true, key }))
}

/// POST /admin/ban
pub async fn ban_key(
    State(state): State<AppState>,
    Json(req): Json<ReasonedKeyRequest>,
) -> Result<Json<OkResponse>> {
    let key = require_key(&req.key)?;
    let reason = trimmed_reason(&req.reason);
    state.store.ban(&key, &reason, Utc::now().timestamp())?;
    tracing::info!(key = %key, reason = %reason, "license key banned");
    Ok(Json(OkResponse { ok: true }))
}

/// POST /admin/unban
pub async fn unban_key(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<OkResponse>> {
    let key = require_key(&req.key)?;
    state.store.unban(&key)?;
    tracing::info!(key = %key, "license key unbanned");
    Ok(Json(OkResponse { ok: true }))
}

/// POST /admin/deactivate
pub async fn deactivate_key(
    State(state): State<AppState>,
    Json(req): Json<ReasonedKeyRequest>,
) -> Result<Json<OkResponse>> {
    let key = require_key(&req.key)?;
    let reason = trimmed_reason(&req.reason);
    state
        .store
        .deactivate(&key, &reason, Utc::now().timestamp())?;
    tracing::info!(key = %key, reason = %reason, "license key deactivated");
    Ok(Json(OkResponse { ok: true }))
}

/// POST /admin/reactivate - clears both deactivation and ban.
pub async fn reactivate_key(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<OkResponse>> {
    let key = require_key(&req.key)?;
    state.store.reactivate(&key)?;
    tracing::info!(key = %key, "license key reactivated");
    Ok(Json(OkResponse { ok: true }))
}

/// POST /admin/delete - purge the key from every set.
pub async fn delete_key(
    State(state): State<AppState>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<OkResponse>> {
    let key = require_key(&req.key)?;
    state.store.delete(&key)?;
    tracing::info!(key = %key, "license key deleted");
    Ok(Json(OkResponse { ok: true }))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/keys", get(list_keys))
        .route("/admin/keys/create", post(create_key))
        .route("/admin/ban", post(ban_key))
        .route("/admin/unban", post(unban_key))
        .route("/admin/deactivate", post(deactivate_key))
        .route("/admin/reactivate", post(reactivate_key))
        .route("/admin/delete", post(delete_key))
        .route_layer(from_fn_with_state(state, admin_auth))
}
