use serde::{Deserialize, Serialize};

/// A license key known to the server, bound to the machine that last
/// verified it. `last_seen_at` is None until the first successful
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    pub key: String,
    pub hwid: String,
    pub created_at: i64,
    pub last_seen_at: Option<i64>,
}

/// An administrative ban. `hwid` is copied from the issued record at ban
/// time (empty string if the key was unknown) so the ban keeps blocking the
/// machine even after the key itself is deleted or rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub key: String,
    pub hwid: String,
    pub reason: String,
    pub banned_at: i64,
}

/// A deactivation (e.g. subscription lapse). Key-scoped only; cleared when
/// the key is banned, since a ban supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivation {
    pub key: String,
    pub reason: String,
    pub deactivated_at: i64,
}
