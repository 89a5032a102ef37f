//! Shared-secret API key handling for internal (worker → API) endpoints.
//!
//! The API never keeps the plaintext key around after startup: it stores the
//! SHA-256 digest and compares digests in constant time so response timing
//! does not leak how much of a guessed key matched.

use sha2::{Digest, Sha256};

/// Header carrying the shared secret on internal requests.
pub const API_KEY_HEADER: &str = "x-api-key";

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Compute the SHA-256 hex digest of an API key.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Check a presented key against the stored digest.
///
/// Empty keys never verify, even if the stored digest happens to be the
/// digest of the empty string.
pub fn verify_api_key(presented: &str, expected_hash: &str) -> bool {
    if presented.is_empty() {
        return false;
    }
    constant_time_eq(hash_api_key(presented).as_bytes(), expected_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
