//! Webhook request verification
//!
//! Exactly one verification path per request, in fixed priority order: an
//! HMAC signature header first, then a shared-token header, otherwise reject.
//! All comparisons are constant-time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::QuayError;

type HmacSha256 = Hmac<Sha256>;

/// GitHub signature header
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// GitLab shared-token header
pub const TOKEN_HEADER: &str = "x-gitlab-token";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a webhook request against the configured secret.
///
/// `signature` and `token` are the raw header values when present; `body` is
/// the exact raw request body the signature was computed over.
pub fn verify_request(
    signature: Option<&str>,
    token: Option<&str>,
    body: &[u8],
    secret: &SecretString,
) -> Result<(), QuayError> {
    if let Some(signature) = signature {
        return verify_signature(signature, body, secret);
    }
    if let Some(token) = token {
        return verify_token(token, secret);
    }
    Err(QuayError::AuthError(
        "missing webhook signature or token header".to_string(),
    ))
}

/// Verify `sha256=<hex>` against HMAC-SHA256(secret, body)
fn verify_signature(signature: &str, body: &[u8], secret: &SecretString) -> Result<(), QuayError> {
    let hex_digest = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| QuayError::AuthError("malformed signature header".to_string()))?;

    let claimed = hex::decode(hex_digest)
        .map_err(|_| QuayError::AuthError("malformed signature header".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| QuayError::Internal(e.to_string()))?;
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    if bool::from(computed.as_slice().ct_eq(&claimed)) {
        Ok(())
    } else {
        Err(QuayError::AuthError("invalid webhook signature".to_string()))
    }
}

/// Compare a shared token directly against the secret
fn verify_token(token: &str, secret: &SecretString) -> Result<(), QuayError> {
    if bool::from(token.as_bytes().ct_eq(secret.expose_secret().as_bytes())) {
        Ok(())
    } else {
        Err(QuayError::AuthError("invalid webhook token".to_string()))
    }
}
