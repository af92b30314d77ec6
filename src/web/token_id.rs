//! Session identifier extraction from compact signed tokens.
//!
//! Nothing here checks a signature. The result is only good for revocation
//! bookkeeping and must never be used to authorize a call on its own.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

/// URL-safe alphabet, accepting payloads with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Deserialize)]
struct SessionClaims {
    #[serde(default)]
    jti: Option<String>,
}

/// Returns the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reads the `jti` claim out of `header.payload.signature`.
///
/// Returns `None` for a wrong part count, a payload that is not base64url,
/// a payload that is not a JSON object, or a missing/empty/non-string `jti`.
/// Callers treat `None` as "cannot check", not as a bad request.
pub fn extract_session_id(token: &str) -> Option<String> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = PAYLOAD_ENGINE.decode(payload).ok()?;
    let claims: SessionClaims = serde_json::from_slice(&bytes).ok()?;
    claims.jti.filter(|jti| !jti.is_empty())
}
