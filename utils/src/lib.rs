//! # Project Review Utilities
//!
//! Remote key sanitization, identifier generation, and content fingerprints.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Characters the hosted store forbids in path segments.
pub const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Replaces every forbidden character with `_`.
///
/// Pure: the same input always yields the same key, so independent writers
/// address the same remote path.
///
/// # Examples
///
/// ```
/// use utils::sanitize_key;
///
/// assert_eq!(sanitize_key("v1.2 [beta]"), "v1_2 _beta_");
/// ```
#[must_use]
pub fn sanitize_key(natural_key: &str) -> String {
    natural_key
        .chars()
        .map(|c| if FORBIDDEN_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Whether `key` can be used as a remote path segment as-is.
#[must_use]
pub fn is_valid_remote_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| FORBIDDEN_KEY_CHARS.contains(&c) || c == '/' || c.is_control())
}

/// Generate a new entity identifier (UUID v4)
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// SHA-256 of the canonical JSON encoding of `value`.
///
/// Object keys serialize in sorted order, so equal documents always share a
/// fingerprint regardless of how they were built.
#[must_use]
pub fn content_fingerprint(value: &Value) -> String {
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
