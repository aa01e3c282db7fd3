//! Session-token claims: signing, verification, and the lenient
//! client-side role decode.
//!
//! Tokens are compact HS256 JWTs: `base64url(header).base64url(claims)
//! .base64url(hmac)`. The server signs and verifies; clients only peek
//! at the role claim to pick a UI and never treat the result as proof
//! of anything.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::registrar::constant_time_eq;
use super::Role;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id the session belongs to.
    pub sub: String,
    /// Coarse role for request gating.
    pub role: Role,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// Sign claims into a compact token.
pub fn sign(claims: &Claims, secret: &[u8]) -> Result<String, serde_json::Error> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");
    let sig = URL_SAFE_NO_PAD.encode(hmac_sha256(secret, signing_input.as_bytes()));
    Ok(format!("{signing_input}.{sig}"))
}

/// Verify a token's signature and expiry. Returns the claims only when
/// both hold.
pub fn verify(token: &str, secret: &[u8], now: i64) -> Option<Claims> {
    let mut parts = token.splitn(3, '.');
    let header = parts.next()?;
    let payload = parts.next()?;
    let sig = parts.next()?;

    let signing_input = format!("{header}.{payload}");
    let expected = URL_SAFE_NO_PAD.encode(hmac_sha256(secret, signing_input.as_bytes()));
    if !constant_time_eq(expected.as_bytes(), sig.as_bytes()) {
        return None;
    }

    let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    if claims.exp <= now {
        return None;
    }
    Some(claims)
}

/// Best-effort role extraction for client UI selection. Total: any
/// input that is not a well-formed token with a known role yields
/// `None`, never a panic. Performs **no** signature or expiry check —
/// the backend re-validates every request.
pub fn decode_role(token: &str) -> Option<Role> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;

    // Lenient decode: tolerate padded and unpadded base64url
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    match value.get("role")?.as_str()? {
        "admin" => Some(Role::Admin),
        "employee" => Some(Role::Employee),
        _ => None,
    }
}

fn hmac_sha256(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
