//! Signing key derivation from the configured secret.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use crate::config::ConfigError;

/// Minimum HMAC key length in bytes (256 bits, the HS256 floor).
pub const MIN_KEY_BYTES: usize = 32;

/// Symmetric HMAC key plus the algorithm its length supports.
#[derive(Clone)]
pub struct SigningKey {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Decode a standard-alphabet base64 secret.
    pub fn from_base64(secret: &str) -> Result<Self, ConfigError> {
        let bytes = STANDARD
            .decode(secret.trim())
            .map_err(|e| ConfigError::InvalidSecret(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Build a key from raw bytes.
    ///
    /// The algorithm is the strongest HMAC variant the key length allows:
    /// 64+ bytes → HS512, 48+ → HS384, otherwise HS256.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(ConfigError::SecretTooShort {
                len: bytes.len(),
                min: MIN_KEY_BYTES,
            });
        }
        let algorithm = match bytes.len() {
            n if n >= 64 => Algorithm::HS512,
            n if n >= 48 => Algorithm::HS384,
            _ => Algorithm::HS256,
        };
        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
