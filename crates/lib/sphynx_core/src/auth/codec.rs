//! JWT encoding and verification.
//!
//! Expiry is checked here rather than by `jsonwebtoken`: its check runs with a
//! default leeway and treats `exp == now` as still valid, while tokens here
//! expire at the exact second. The signature is always verified before any
//! claim is read.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation, decode, encode};
use thiserror::Error;

use super::signing_key::SigningKey;
use crate::models::auth::{TYPE_CLAIM, TokenClaims};

/// Registered claims the codec fills in itself.
const RESERVED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

/// Token codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Missing required claim: {0}")]
    MissingClaim(&'static str),

    #[error("Reserved claim cannot be overridden: {0}")]
    ReservedClaim(String),

    #[error("Token encoding failed: {0}")]
    Encode(String),
}

/// Sign a claim set for `subject`, valid for `ttl` from `now`.
///
/// `claims` must contain a `type` entry.
pub fn sign(
    subject: &str,
    claims: &BTreeMap<String, String>,
    ttl: Duration,
    key: &SigningKey,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    if !claims.contains_key(TYPE_CLAIM) {
        return Err(TokenError::MissingClaim(TYPE_CLAIM));
    }
    if let Some(reserved) = RESERVED_CLAIMS.iter().find(|c| claims.contains_key(**c)) {
        return Err(TokenError::ReservedClaim((*reserved).to_string()));
    }

    let ttl = TimeDelta::from_std(ttl).map_err(|e| TokenError::Encode(format!("ttl: {e}")))?;
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| TokenError::Encode("ttl overflows the timestamp range".into()))?;

    let payload = TokenClaims {
        sub: subject.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        extra: claims.clone(),
    };
    encode(&Header::new(key.algorithm()), &payload, key.encoding())
        .map_err(|e| TokenError::Encode(e.to_string()))
}

/// Verify the signature, then the expiry, returning the claims.
///
/// A token is expired once `now >= exp` (second granularity).
pub fn verify(token: &str, key: &SigningKey, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(key.algorithm());
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<TokenClaims>(token, key.decoding(), &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
            _ => TokenError::Malformed,
        }
    })?;

    if now.timestamp() >= data.claims.exp {
        return Err(TokenError::Expired);
    }
    Ok(data.claims)
}
