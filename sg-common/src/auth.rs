//! API token generation and hashing
//!
//! Callers authenticate with `Authorization: Bearer <token>`. Only the
//! SHA-256 hash of a token is ever stored; the plaintext is shown once by the
//! operator CLI when the user is created.
//!
//! This module contains ONLY pure functions. The axum middleware that
//! resolves a caller identity lives in `sg-server`.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Prefix that makes issued tokens easy to recognise in logs and configs
pub const TOKEN_PREFIX: &str = "sg_";

/// Generate a new random API token (prefix + 64 hex chars)
pub fn generate_api_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", TOKEN_PREFIX, hex)
}

/// Hash a token for storage / lookup
///
/// # Examples
///
/// ```
/// use sg_common::auth::hash_api_token;
///
/// let hash = hash_api_token("sg_example");
/// assert_eq!(hash.len(), 64);
/// assert_eq!(hash, hash_api_token("sg_example"));
/// ```
pub fn hash_api_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the token from an `Authorization` header value
///
/// Accepts `Bearer <token>` (scheme is case-insensitive). Returns `None` for
/// any other scheme or an empty token.
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
