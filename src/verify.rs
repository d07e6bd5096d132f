//! License verification flow.
//!
//! Ordered, short-circuiting checks with a fixed precedence: input
//! validation, signature, registration, ban, deactivation. Admin tooling
//! relies on ban/deactivation messages taking priority over "not
//! registered", so the order must not change. The signature check runs
//! before any store access - forged traffic is rejected at the cheapest
//! possible point.

use chrono::Utc;
use serde::Serialize;

use crate::crypto;
use crate::store::{LicenseStore, StoreResult};

pub const REASON_MISSING_FIELDS: &str = "missing key or hwid";
pub const REASON_BAD_SIGNATURE: &str = "key invalid for this hardware id";
pub const REASON_NOT_REGISTERED: &str = "key not registered";
pub const REASON_HWID_BANNED: &str = "hardware id banned by administrator";
pub const REASON_SERVER_ERROR: &str = "server error, try again";

/// Verdict returned to the client. `reason` is empty when valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reason: String,
}

impl VerificationResult {
    pub fn approved() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Answer "is this (key, hwid) pair currently valid" and record the
/// observation. Storage faults fail closed: the caller gets a generic
/// server-error verdict, never an approval, and the fault is logged.
pub fn verify_key(
    store: &dyn LicenseStore,
    secret: &[u8],
    allow_self_register: bool,
    raw_key: &str,
    raw_hwid: &str,
) -> VerificationResult {
    match check(store, secret, allow_self_register, raw_key, raw_hwid) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("verification aborted by storage fault: {}", e);
            VerificationResult::rejected(REASON_SERVER_ERROR)
        }
    }
}

fn check(
    store: &dyn LicenseStore,
    secret: &[u8],
    allow_self_register: bool,
    raw_key: &str,
    raw_hwid: &str,
) -> StoreResult<VerificationResult> {
    let key = crypto::normalize(raw_key);
    let hwid = crypto::normalize(raw_hwid);
    if key.is_empty() || hwid.is_empty() {
        return Ok(VerificationResult::rejected(REASON_MISSING_FIELDS));
    }

    // Stateless signature check first; no store access on this path.
    let parsed = match crypto::parse(&key) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(VerificationResult::rejected(REASON_BAD_SIGNATURE)),
    };
    if !crypto::verify_parsed(&parsed, &hwid, secret) {
        return Ok(VerificationResult::rejected(REASON_BAD_SIGNATURE));
    }
    let key = parsed.canonical();

    if store.get_issued(key)?.is_none() && !allow_self_register {
        return Ok(VerificationResult::rejected(REASON_NOT_REGISTERED));
    }

    if let Some(ban) = store.find_ban(key, &hwid)? {
        let reason = if ban.key == key {
            format!("license banned: {}", ban.reason)
        } else {
            REASON_HWID_BANNED.to_string()
        };
        return Ok(VerificationResult::rejected(reason));
    }

    if let Some(deactivation) = store.find_deactivation(key)? {
        return Ok(VerificationResult::rejected(format!(
            "license deactivated: {}",
            deactivation.reason
        )));
    }

    store.upsert_issued_on_verify(key, &hwid, Utc::now().timestamp())?;
    Ok(VerificationResult::approved())
}
