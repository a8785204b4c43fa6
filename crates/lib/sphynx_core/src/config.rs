//! Core configuration.
//!
//! Built once at process start and passed by value into the services that
//! need it; nothing here is read from the environment.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::agents::liveness::LivenessSettings;
use crate::auth::signing_key::SigningKey;
use crate::auth::tokens::TokenSettings;

/// Default session token lifetime: 24 hours.
pub const DEFAULT_AUTH_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default password-reset token lifetime: 15 minutes.
pub const DEFAULT_RESET_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

/// Default liveness sweep period.
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(5);

/// Default silence allowed before an agent is presumed dead.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(10);

/// Fatal startup configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Signing secret is not valid base64: {0}")]
    InvalidSecret(String),

    #[error("Signing secret is {len} bytes; at least {min} bytes are required")]
    SecretTooShort { len: usize, min: usize },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Immutable settings for the token service and the liveness sweeper.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base64-encoded HMAC secret.
    pub signing_secret: String,
    pub auth_token_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub sweep_period: Duration,
    pub freshness_window: Duration,
}

impl CoreConfig {
    /// Config with default durations for the given secret.
    pub fn with_secret(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            auth_token_ttl: DEFAULT_AUTH_TOKEN_TTL,
            reset_token_ttl: DEFAULT_RESET_TOKEN_TTL,
            sweep_period: DEFAULT_SWEEP_PERIOD,
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    /// Reject zero durations. A zero TTL would mint already-expired tokens and
    /// a zero sweep period cannot drive a timer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("auth token TTL", self.auth_token_ttl),
            ("reset token TTL", self.reset_token_ttl),
            ("sweep period", self.sweep_period),
            ("freshness window", self.freshness_window),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Validate and derive the signing key.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        self.validate()?;
        SigningKey::from_base64(&self.signing_secret)
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            auth_ttl: self.auth_token_ttl,
            reset_ttl: self.reset_token_ttl,
        }
    }

    pub fn liveness_settings(&self) -> LivenessSettings {
        LivenessSettings {
            period: self.sweep_period,
            freshness_window: self.freshness_window,
        }
    }
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("signing_secret", &"<redacted>")
            .field("auth_token_ttl", &self.auth_token_ttl)
            .field("reset_token_ttl", &self.reset_token_ttl)
            .field("sweep_period", &self.sweep_period)
            .field("freshness_window", &self.freshness_window)
            .finish()
    }
}
