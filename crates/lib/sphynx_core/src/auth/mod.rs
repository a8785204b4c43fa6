//! Authentication: signing keys, the JWT codec, the typed token service and
//! password hashing.
//!
//! Shared by the account flows in [`crate::accounts`] and by the request
//! authentication middleware in `sphynx_api`.

pub mod codec;
pub mod password;
pub mod signing_key;
pub mod tokens;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
///
/// Every codec failure (malformed, bad signature, expired) surfaces as
/// [`AuthError::InvalidToken`] so callers cannot tell them apart.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token type mismatch")]
    TokenKindMismatch,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    CredentialError,

    #[error("Email already in use")]
    EmailTaken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
