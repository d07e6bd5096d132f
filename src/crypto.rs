//! License key signature scheme.
//!
//! Keys have the form `SRM-RRRR-RRRR-SSSS-SSSS`: a random payload (segments
//! 1-2) bound to a hardware id by a truncated HMAC-SHA256 signature
//! (segments 3-4). The scheme is deterministic and stateless - the server
//! keeps no per-key secret, only the shared HMAC key it has in common with
//! the key generator.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Literal first segment of every license key.
pub const KEY_PREFIX: &str = "SRM";

/// Number of dash-separated segments in a well-formed key.
pub const KEY_SEGMENT_COUNT: usize = 5;

/// Length of the truncated hex signature (first 4 bytes of the digest).
///
/// 32 bits is an accepted trade-off for short typeable keys. Widening it
/// would invalidate every key already in the field.
pub const SIGNATURE_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFormatError {
    /// Not exactly five dash-separated segments.
    #[error("license key must have exactly {KEY_SEGMENT_COUNT} dash-separated segments")]
    WrongSegmentCount,

    /// First segment is not the `SRM` literal.
    #[error("license key must start with the '{KEY_PREFIX}-' prefix")]
    MissingPrefix,
}

/// A parsed license key.
///
/// Holds the canonical (normalized, dash-joined) key string alongside the
/// two halves the signature scheme operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    canonical: String,
    random: String,
    signature: String,
}

impl ParsedKey {
    /// The canonical key string: normalized and dash-joined. This is the
    /// form the store is keyed by.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Random payload: segments 1-2 concatenated.
    pub fn random(&self) -> &str {
        &self.random
    }

    /// Presented signature: segments 3-4 concatenated.
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Normalize raw key or hardware-id input: trim, strip internal spaces,
/// uppercase. Malformed input from the wild is expected traffic, so this
/// never fails.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Parse a raw key string into its segments.
pub fn parse(raw: &str) -> Result<ParsedKey, KeyFormatError> {
    let normalized = normalize(raw);
    let segments: Vec<&str> = normalized.split('-').collect();

    if segments.len() != KEY_SEGMENT_COUNT {
        return Err(KeyFormatError::WrongSegmentCount);
    }
    if segments[0] != KEY_PREFIX {
        return Err(KeyFormatError::MissingPrefix);
    }

    Ok(ParsedKey {
        random: format!("{}{}", segments[1], segments[2]),
        signature: format!("{}{}", segments[3], segments[4]),
        canonical: normalized,
    })
}

/// Compute the expected signature for a random payload bound to a hardware
/// id: HMAC-SHA256 over the UTF-8 bytes of `random + hwid`, hex-encoded,
/// truncated to [`SIGNATURE_LEN`] characters, uppercased.
pub fn expected_signature(random: &str, hwid: &str, secret: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(random.as_bytes());
    mac.update(hwid.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    digest[..SIGNATURE_LEN].to_uppercase()
}

/// Check a parsed key's signature against a hardware id.
pub fn verify_parsed(key: &ParsedKey, hwid: &str, secret: &[u8]) -> bool {
    let expected = expected_signature(&key.random, hwid, secret);

    // Length check is not constant-time, but the signature length is not
    // secret - it's always SIGNATURE_LEN hex chars.
    if key.signature.len() != expected.len() {
        return false;
    }

    // Constant-time comparison to prevent timing attacks on the signature.
    expected.as_bytes().ct_eq(key.signature.as_bytes()).into()
}

/// Verify a raw key string against a hardware id. Parse failures return
/// false rather than an error - forged and mistyped keys are routine input.
pub fn verify(raw_key: &str, hwid: &str, secret: &[u8]) -> bool {
    match parse(raw_key) {
        Ok(parsed) => verify_parsed(&parsed, hwid, secret),
        Err(_) => false,
    }
}

/// Assemble the canonical dash form from an 8-char random payload and an
/// 8-char signature.
pub fn build_key(random: &str, signature: &str) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        KEY_PREFIX,
        &random[..4],
        &random[4..],
        &signature[..4],
        &signature[4..]
    )
}
