//! Deterministic content fingerprints.
//!
//! Used as cache keys and as dedup keys for retrieved passages. Structured
//! data is serialized through `serde_json::Value`, whose object maps are
//! ordered by key, so structurally equal inputs hash identically regardless
//! of field order.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fingerprint a raw string: hex-encoded SHA-256 of its UTF-8 bytes.
pub fn fingerprint_str(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Fingerprint arbitrary serializable key data.
///
/// Strings are hashed as-is; anything else goes through a canonical JSON
/// form with sorted object keys first.
pub fn fingerprint<K: Serialize + ?Sized>(key: &K) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(key)?;
    let canonical = match value {
        serde_json::Value::String(s) => s,
        other => serde_json::to_string(&other)?,
    };
    Ok(fingerprint_str(&canonical))
}
