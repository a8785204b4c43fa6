//! Token domain models.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Claim name carrying the token kind.
pub const TYPE_CLAIM: &str = "type";

/// Purpose a signed token was issued for.
///
/// Both kinds share one signing key; the `type` claim keeps their uses disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenKind {
    /// Session credential for an authenticated user.
    Auth,
    /// Single-purpose credential for a password reset.
    Reset,
}

impl TokenKind {
    /// Claim value.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Auth => "AUTH",
            TokenKind::Reset => "RESET",
        }
    }

    /// Parse a claim value. Case-sensitive.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "AUTH" => Some(TokenKind::Auth),
            "RESET" => Some(TokenKind::Reset),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Private claims, including `type`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TokenClaims {
    /// Look up a private claim.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str)
    }

    /// The token kind, if the `type` claim names a known kind.
    pub fn kind(&self) -> Option<TokenKind> {
        self.get(TYPE_CLAIM).and_then(TokenKind::from_claim)
    }
}
