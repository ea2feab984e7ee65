//! ID token claim extraction.
//!
//! Tokens arrive directly from the provider over TLS, so only the payload
//! is decoded; the signature is not verified here.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{AuthError, AuthErrorKind};
use crate::model::UserIdentity;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Identity and expiry carried by an ID token.
#[derive(Debug, Clone)]
pub(crate) struct DecodedIdToken {
    pub identity: UserIdentity,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Decode the payload segment of a JWT.
///
/// `fallback_email` is used when the token carries no `email` claim.
pub(crate) fn decode_id_token(
    token: &str,
    fallback_email: Option<&str>,
) -> Result<DecodedIdToken, AuthError> {
    let payload = token.split('.').nth(1).ok_or_else(|| {
        AuthError::new(AuthErrorKind::InvalidResponse, "ID token is not a JWT")
    })?;

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| {
            AuthError::new(
                AuthErrorKind::InvalidResponse,
                format!("ID token payload is not base64url: {}", e),
            )
        })?;

    let claims: IdTokenClaims = serde_json::from_slice(&bytes).map_err(|e| {
        AuthError::new(
            AuthErrorKind::InvalidResponse,
            format!("ID token claims are malformed: {}", e),
        )
    })?;

    let email = claims
        .email
        .or_else(|| fallback_email.map(str::to_string))
        .unwrap_or_default();

    Ok(DecodedIdToken {
        identity: UserIdentity::new(claims.sub, email),
        expires_at: claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
    })
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.sig", header, payload)
}
