//! Typed token service: issues and checks `AUTH` / `RESET` tokens bound to a
//! user id, and resolves a token back to its user.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use super::AuthError;
use super::codec;
use super::signing_key::SigningKey;
use crate::clock::Clock;
use crate::models::auth::{TYPE_CLAIM, TokenKind};
use crate::models::user::User;
use crate::store::UserDirectory;

/// Token lifetimes per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub auth_ttl: Duration,
    pub reset_ttl: Duration,
}

impl TokenSettings {
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Auth => self.auth_ttl,
            TokenKind::Reset => self.reset_ttl,
        }
    }
}

/// Issues and validates typed tokens.
///
/// Cheap to clone; the key is shared and never mutated.
#[derive(Clone)]
pub struct TokenService {
    key: Arc<SigningKey>,
    settings: TokenSettings,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        key: SigningKey,
        settings: TokenSettings,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key: Arc::new(key),
            settings,
            directory,
            clock,
        }
    }

    pub fn settings(&self) -> TokenSettings {
        self.settings
    }

    /// Sign a token of `kind` for `user_id`.
    pub fn issue_token(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AuthError> {
        let claims = BTreeMap::from([(TYPE_CLAIM.to_string(), kind.as_str().to_string())]);
        codec::sign(
            &user_id.to_string(),
            &claims,
            self.settings.ttl(kind),
            &self.key,
            self.clock.now(),
        )
        .map_err(|e| AuthError::Internal(format!("token signing: {e}")))
    }

    /// Whether `token` is a well-signed, unexpired token of `expected` kind.
    ///
    /// Never fails; any problem yields `false`.
    pub fn validate_token(&self, token: &str, expected: TokenKind) -> bool {
        match self.check(token, expected) {
            Ok(_) => true,
            Err(e) => {
                debug!(expected = %expected, "token rejected: {e}");
                false
            }
        }
    }

    /// Resolve `token` to the user it was issued for.
    pub async fn resolve_user(&self, token: &str, expected: TokenKind) -> Result<User, AuthError> {
        let user_id = self.check(token, expected)?;
        self.directory
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Shared by `validate_token` and `resolve_user` so the two agree.
    fn check(&self, token: &str, expected: TokenKind) -> Result<Uuid, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }
        let claims = codec::verify(token, &self.key, self.clock.now()).map_err(|e| {
            debug!("token verification failed: {e}");
            AuthError::InvalidToken
        })?;
        if claims.kind() != Some(expected) {
            return Err(AuthError::TokenKindMismatch);
        }
        crate::uuid::parse_id(&claims.sub).ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use crate::testing::{TEST_SECRET, fixed_now, sample_user};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::TimeDelta;

    const SETTINGS: TokenSettings = TokenSettings {
        auth_ttl: Duration::from_secs(3600),
        reset_ttl: Duration::from_secs(600),
    };

    struct Fixture {
        service: TokenService,
        store: Arc<MemoryStore>,
        clock: ManualClock,
        user: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(fixed_now());
        let user = store.save_user(sample_user("ada@example.com")).await.unwrap();
        let service = TokenService::new(
            SigningKey::from_base64(TEST_SECRET).unwrap(),
            SETTINGS,
            store.clone(),
            Arc::new(clock.clone()),
        );
        Fixture {
            service,
            store,
            clock,
            user,
        }
    }

    /// `validate_token` is true exactly when `resolve_user` does not report a
    /// token problem.
    async fn assert_agree(service: &TokenService, token: &str, kind: TokenKind) {
        let valid = service.validate_token(token, kind);
        let resolved = service.resolve_user(token, kind).await;
        let token_rejected = matches!(
            resolved,
            Err(AuthError::InvalidToken) | Err(AuthError::TokenKindMismatch)
        );
        assert_eq!(valid, !token_rejected, "disagreement for {token:?} / {kind}");
    }

    #[tokio::test]
    async fn issued_token_resolves_to_user_for_both_kinds() {
        let f = fixture().await;
        for kind in [TokenKind::Auth, TokenKind::Reset] {
            let token = f.service.issue_token(f.user.id, kind).unwrap();
            assert!(f.service.validate_token(&token, kind));
            let resolved = f.service.resolve_user(&token, kind).await.unwrap();
            assert_eq!(resolved.id, f.user.id);
            assert_eq!(resolved.email, "ada@example.com");
        }
    }

    #[tokio::test]
    async fn kind_mismatch_is_rejected() {
        let f = fixture().await;
        let reset = f.service.issue_token(f.user.id, TokenKind::Reset).unwrap();
        assert!(!f.service.validate_token(&reset, TokenKind::Auth));
        assert!(matches!(
            f.service.resolve_user(&reset, TokenKind::Auth).await,
            Err(AuthError::TokenKindMismatch)
        ));

        let auth = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();
        assert!(!f.service.validate_token(&auth, TokenKind::Reset));
    }

    #[tokio::test]
    async fn ttl_follows_kind() {
        let f = fixture().await;
        let reset = f.service.issue_token(f.user.id, TokenKind::Reset).unwrap();
        let auth = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();

        f.clock.advance(TimeDelta::seconds(600));
        assert!(!f.service.validate_token(&reset, TokenKind::Reset));
        assert!(f.service.validate_token(&auth, TokenKind::Auth));
    }

    #[tokio::test]
    async fn token_expires_at_exact_instant() {
        let f = fixture().await;
        let token = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();

        f.clock.advance(TimeDelta::seconds(3599));
        assert!(f.service.validate_token(&token, TokenKind::Auth));

        f.clock.advance(TimeDelta::seconds(1));
        assert!(!f.service.validate_token(&token, TokenKind::Auth));
        assert!(matches!(
            f.service.resolve_user(&token, TokenKind::Auth).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn deleted_user_is_not_found_but_token_still_valid() {
        let f = fixture().await;
        let token = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();
        f.store.delete_user(f.user.id).await.unwrap();

        assert!(f.service.validate_token(&token, TokenKind::Auth));
        assert!(matches!(
            f.service.resolve_user(&token, TokenKind::Auth).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn tampered_payload_is_invalid_at_every_position() {
        let f = fixture().await;
        let token = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        for i in 0..parts[1].len() {
            let mut payload = parts[1].to_string();
            let replacement = if payload.as_bytes()[i] == b'x' { "y" } else { "x" };
            payload.replace_range(i..i + 1, replacement);
            let tampered = format!("{}.{}.{}", parts[0], payload, parts[2]);

            assert!(!f.service.validate_token(&tampered, TokenKind::Auth));
            assert!(matches!(
                f.service.resolve_user(&tampered, TokenKind::Auth).await,
                Err(AuthError::InvalidToken)
            ));
        }
    }

    #[tokio::test]
    async fn forged_kind_upgrade_is_rejected() {
        let f = fixture().await;
        let reset = f.service.issue_token(f.user.id, TokenKind::Reset).unwrap();
        let parts: Vec<&str> = reset.split('.').collect();

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let forged = String::from_utf8(payload).unwrap().replace("RESET", "AUTH");
        let forged = URL_SAFE_NO_PAD.encode(forged);
        let token = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(!f.service.validate_token(&token, TokenKind::Auth));
    }

    #[tokio::test]
    async fn non_uuid_subject_is_invalid() {
        let f = fixture().await;
        let claims = BTreeMap::from([(TYPE_CLAIM.to_string(), "AUTH".to_string())]);
        let token = codec::sign(
            "not-a-uuid",
            &claims,
            Duration::from_secs(60),
            &SigningKey::from_base64(TEST_SECRET).unwrap(),
            f.clock.now(),
        )
        .unwrap();

        assert!(!f.service.validate_token(&token, TokenKind::Auth));
        assert!(matches!(
            f.service.resolve_user(&token, TokenKind::Auth).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn lowercase_kind_claim_is_a_mismatch() {
        let f = fixture().await;
        let claims = BTreeMap::from([(TYPE_CLAIM.to_string(), "auth".to_string())]);
        let token = codec::sign(
            &f.user.id.to_string(),
            &claims,
            Duration::from_secs(60),
            &SigningKey::from_base64(TEST_SECRET).unwrap(),
            f.clock.now(),
        )
        .unwrap();

        assert!(!f.service.validate_token(&token, TokenKind::Auth));
        assert!(matches!(
            f.service.resolve_user(&token, TokenKind::Auth).await,
            Err(AuthError::TokenKindMismatch)
        ));
    }

    #[tokio::test]
    async fn validate_and_resolve_never_disagree() {
        let f = fixture().await;
        let auth = f.service.issue_token(f.user.id, TokenKind::Auth).unwrap();
        let reset = f.service.issue_token(f.user.id, TokenKind::Reset).unwrap();
        let orphan = f.service.issue_token(Uuid::now_v7(), TokenKind::Auth).unwrap();
        let mut truncated = auth.clone();
        truncated.pop();

        let samples = [
            auth.as_str(),
            reset.as_str(),
            orphan.as_str(),
            truncated.as_str(),
            "",
            "   ",
            "not-a-token",
            "a.b.c",
        ];
        for kind in [TokenKind::Auth, TokenKind::Reset] {
            for token in samples {
                assert_agree(&f.service, token, kind).await;
            }
        }

        f.clock.advance(TimeDelta::hours(2));
        for kind in [TokenKind::Auth, TokenKind::Reset] {
            for token in samples {
                assert_agree(&f.service, token, kind).await;
            }
        }
    }
}
