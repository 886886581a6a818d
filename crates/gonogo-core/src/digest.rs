//! Failure digests: bounded SHA-256 of a failure message.
//!
//! The Execution Collector recognizes recurring failures by comparing
//! digests, never full messages.

use sha2::{Digest, Sha256};

/// Hex characters kept from the full SHA-256 digest.
pub const DIGEST_LEN: usize = 16;

/// Computes the truncated digest of a failure message.
///
/// Messages are trimmed before hashing so that trailing whitespace from
/// different runner versions does not defeat recurrence detection.
pub fn failure_digest(message: &str) -> String {
    let hash = Sha256::digest(message.trim().as_bytes());
    let mut out = String::with_capacity(DIGEST_LEN);
    for byte in hash.iter().take(DIGEST_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
