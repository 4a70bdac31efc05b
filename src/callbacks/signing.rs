//! Request body signing for merchant callbacks.
//!
//! Every callback POST carries a `bodysign` header: HMAC-SHA256 over the
//! exact bytes of the request body, keyed with the merchant secret, encoded
//! as standard base64 with `+` and `/` swapped for `-` and `_`. Merchants
//! verify the header against the raw body before trusting the payload, so
//! the signature must be computed over the transmitted bytes and never over
//! a re-serialized copy.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name of the signature header attached to callback requests.
pub const SIGNATURE_HEADER: &str = "bodysign";

/// Compute the `bodysign` value for a callback body.
///
/// Returns an empty string if the HMAC cannot be initialized, which for
/// HMAC-SHA256 only happens on an internal digest failure.
pub fn sign_body(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();

    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(digest).replace('+', "-").replace('/', "_")
}

/// Verify a `bodysign` header received from a counterparty.
pub fn verify_body_signature(body: &[u8], secret: &str, signature: &str) -> bool {
    let expected = sign_body(body, secret);
    if expected.is_empty() {
        return false;
    }
    secure_eq(expected.as_bytes(), signature.as_bytes())
}

/// Constant-time comparison to avoid leaking signature prefixes via timing.
fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
