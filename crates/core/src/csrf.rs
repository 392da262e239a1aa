//! Stateless CSRF tokens bound to a session.
//!
//! Token format: `nonce.expiry.signature` where `expiry` is a unix timestamp
//! in seconds and `signature` is HMAC-SHA256 over
//! `session_id.nonce.expiry`.

use chrono::Duration;

use crate::hashing;
use crate::types::Timestamp;

/// Lifetime of an issued token.
pub fn token_ttl() -> Duration {
    Duration::hours(1)
}

const NONCE_BYTES: usize = 16;

/// HTTP methods that must carry a CSRF token.
pub fn requires_token(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    )
}

fn sign(secret: &[u8], session_id: &str, nonce: &str, expiry: i64) -> String {
    hashing::hmac_sha256_hex(secret, format!("{session_id}.{nonce}.{expiry}").as_bytes())
}

/// Issue a token for `session_id` valid until `now + token_ttl()`.
pub fn issue_token(secret: &[u8], session_id: &str, now: Timestamp) -> String {
    let nonce = hashing::random_hex(NONCE_BYTES);
    let expiry = (now + token_ttl()).timestamp();
    let signature = sign(secret, session_id, &nonce, expiry);
    format!("{nonce}.{expiry}.{signature}")
}

/// Check a token's signature (constant time) and expiry.
pub fn verify_token(secret: &[u8], session_id: &str, token: &str, now: Timestamp) -> bool {
    let mut parts = token.splitn(3, '.');
    let (Some(nonce), Some(expiry), Some(signature)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(expiry) = expiry.parse::<i64>() else {
        return false;
    };
    let expected = sign(secret, session_id, nonce, expiry);
    hashing::constant_time_eq(&expected, signature) && now.timestamp() <= expiry
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
