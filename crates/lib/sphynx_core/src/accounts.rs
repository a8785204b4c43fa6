//! Account flows: sign-up, sign-in and password reset.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::auth::AuthError;
use crate::auth::password::{
    check_password_policy, hash_password, verify_missing_account, verify_password,
};
use crate::auth::tokens::TokenService;
use crate::clock::Clock;
use crate::models::{TokenKind, User, UserRole};
use crate::store::{StoreError, UserDirectory};
use crate::uuid::new_id;

/// Sign-up input.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// A signed-in user and its session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// Delivers password-reset tokens to users.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_token(&self, user: &User, token: &str) -> Result<(), AuthError>;
}

/// Writes reset tokens to the log. For development setups without mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingResetNotifier;

#[async_trait]
impl ResetNotifier for TracingResetNotifier {
    async fn send_reset_token(&self, user: &User, token: &str) -> Result<(), AuthError> {
        info!(user_id = %user.id, "Password reset requested");
        debug!(user_id = %user.id, reset_token = token, "Reset token issued");
        Ok(())
    }
}

/// Trimmed, lowercased email.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn check_email(email: &str) -> Result<(), AuthError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(AuthError::ValidationError("Email is not valid".into()))
    }
}

pub(crate) fn check_name(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::ValidationError(format!("{field} is required")));
    }
    Ok(())
}

/// Sign-up, sign-in and password reset on top of the token service.
#[derive(Clone)]
pub struct AccountService {
    directory: Arc<dyn UserDirectory>,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn ResetNotifier>,
}

impl AccountService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn ResetNotifier>,
    ) -> Self {
        Self {
            directory,
            tokens,
            clock,
            notifier,
        }
    }

    fn session(&self, user: User) -> Result<Session, AuthError> {
        let token = self.tokens.issue_token(user.id, TokenKind::Auth)?;
        Ok(Session {
            user,
            token,
            expires_in: self.tokens.settings().auth_ttl.as_secs(),
        })
    }

    /// Create an enabled `USER` account and sign it in.
    pub async fn register(&self, input: SignUp) -> Result<Session, AuthError> {
        let email = normalize_email(&input.email);
        check_name("firstName", &input.first_name)?;
        check_name("lastName", &input.last_name)?;
        check_email(&email)?;
        check_password_policy(&input.password)?;

        if self.directory.email_exists(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let now = self.clock.now();
        let user = User {
            id: new_id(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email,
            password_hash: hash_password(&input.password)?,
            enabled: true,
            account_non_expired: true,
            account_non_locked: true,
            credentials_non_expired: true,
            roles: BTreeSet::from([UserRole::User]),
            created_at: now,
            updated_at: now,
        };
        let user = match self.directory.save_user(user).await {
            Ok(user) => user,
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %user.id, "User registered");
        self.session(user)
    }

    /// Check credentials and issue a session token.
    ///
    /// Unknown email, wrong password and a disabled or locked account all
    /// fail with the same [`AuthError::CredentialError`].
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.directory.find_user_by_email(&email).await? else {
            verify_missing_account(password);
            return Err(AuthError::CredentialError);
        };
        if !verify_password(password, &user.password_hash).unwrap_or(false) {
            return Err(AuthError::CredentialError);
        }
        if !user.can_sign_in() {
            warn!(user_id = %user.id, "Sign-in refused by account flags");
            return Err(AuthError::CredentialError);
        }
        debug!(user_id = %user.id, "User signed in");
        self.session(user)
    }

    /// Issue a `RESET` token and hand it to the notifier.
    ///
    /// Unknown emails are accepted silently so the outcome does not reveal
    /// which addresses are registered.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.directory.find_user_by_email(&email).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };
        let token = self.tokens.issue_token(user.id, TokenKind::Reset)?;
        self.notifier.send_reset_token(&user, &token).await
    }

    /// Set a new password for the holder of a valid `RESET` token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        if !self.tokens.validate_token(token, TokenKind::Reset) {
            return Err(AuthError::InvalidToken);
        }
        check_password_policy(new_password)?;

        let mut user = self.tokens.resolve_user(token, TokenKind::Reset).await?;
        user.password_hash = hash_password(new_password)?;
        user.updated_at = self.clock.now();
        let user = self.directory.save_user(user).await?;
        info!(user_id = %user.id, "Password reset");
        Ok(user)
    }
}
