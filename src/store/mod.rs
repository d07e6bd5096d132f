//! Durable authorization state: issued keys, bans, and deactivations.
//!
//! The store is the only shared mutable resource across requests. Both
//! backends implement the same [`LicenseStore`] contract; call sites never
//! branch on backend kind. Every mutation is durable before it returns -
//! a crash after an acknowledged ban must not be able to un-ban a key.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Ban, Deactivation, IssuedKey};
use crate::rate_limit::SlidingWindowLimiter;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("license key already registered")]
    AlreadyExists,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("data file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Full dump of the three record sets, newest-first within each set.
/// This is the `/admin/keys` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDump {
    pub keys: Vec<IssuedKey>,
    pub banned: Vec<Ban>,
    pub deactivated: Vec<Deactivation>,
}

/// Capability set of the authorization store.
///
/// Keys passed in are expected to be in canonical form (see
/// [`crate::crypto::normalize`]); the store does not re-normalize.
/// Per-key mutations are atomic: callers never read-modify-write.
pub trait LicenseStore: Send + Sync {
    fn get_issued(&self, key: &str) -> StoreResult<Option<IssuedKey>>;

    /// Admin-path registration. Fails with [`StoreError::AlreadyExists`] if
    /// the key is already present.
    fn create_issued(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()>;

    /// Record a successful verification: insert if absent, else update the
    /// bound hwid and `last_seen_at`. Atomic per key - concurrent
    /// verifications of the same key must not lose updates.
    fn upsert_issued_on_verify(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()>;

    /// Find a ban matching the presented key or hardware id. A key match
    /// wins over an hwid-only match so the caller can report the ban reason.
    fn find_ban(&self, key: &str, hwid: &str) -> StoreResult<Option<Ban>>;

    fn find_deactivation(&self, key: &str) -> StoreResult<Option<Deactivation>>;

    /// Ban a key: copy its current hwid (empty string if unknown), remove
    /// any deactivation for it, and upsert the ban. Re-banning updates the
    /// reason and timestamp, never duplicates.
    fn ban(&self, key: &str, reason: &str, now: i64) -> StoreResult<()>;

    /// Remove a ban. No-op if the key is not banned.
    fn unban(&self, key: &str) -> StoreResult<()>;

    /// Upsert a deactivation. Does not touch an existing ban.
    fn deactivate(&self, key: &str, reason: &str, now: i64) -> StoreResult<()>;

    /// Remove both ban and deactivation. No-op if neither exists.
    fn reactivate(&self, key: &str) -> StoreResult<()>;

    /// Purge the key from all three sets. No-op if unknown.
    fn delete(&self, key: &str) -> StoreResult<()>;

    fn list_all(&self) -> StoreResult<StoreDump>;
}

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LicenseStore>,
    /// Shared HMAC secret, identical to the one the key generator uses.
    pub license_secret: Arc<Vec<u8>>,
    /// Shared admin token. Empty means the admin surface is locked.
    pub admin_token: Arc<String>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
    /// Register correctly-signed but unknown keys on first verify.
    pub allow_self_register: bool,
}
