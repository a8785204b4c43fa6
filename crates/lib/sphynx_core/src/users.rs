//! User administration.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::accounts::{check_email, check_name, normalize_email};
use crate::auth::AuthError;
use crate::auth::password::{check_password_policy, hash_password};
use crate::clock::Clock;
use crate::models::{User, UserRole};
use crate::store::{StoreError, UserDirectory};
use crate::uuid::new_id;

/// User administration errors.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("Email already in use")]
    EmailTaken,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for UserError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ValidationError(msg) => UserError::Validation(msg),
            AuthError::EmailTaken => UserError::EmailTaken,
            AuthError::UserNotFound => UserError::NotFound,
            AuthError::Store(e) => UserError::Store(e),
            other => UserError::Internal(other.to_string()),
        }
    }
}

/// Admin-supplied account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub enabled: bool,
    pub account_non_expired: bool,
    pub account_non_locked: bool,
    pub credentials_non_expired: bool,
    pub roles: BTreeSet<UserRole>,
}

/// Partial user update.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub enabled: Option<bool>,
    pub account_non_expired: Option<bool>,
    pub account_non_locked: Option<bool>,
    pub credentials_non_expired: Option<bool>,
    pub roles: Option<BTreeSet<UserRole>>,
}

#[derive(Clone)]
pub struct UserService {
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

fn map_save_error(err: StoreError) -> UserError {
    match err {
        StoreError::Conflict(_) => UserError::EmailTaken,
        other => UserError::Store(other),
    }
}

impl UserService {
    pub fn new(directory: Arc<dyn UserDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { directory, clock }
    }

    pub async fn get(&self, id: Uuid) -> Result<User, UserError> {
        self.directory.find_user(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, UserError> {
        self.directory
            .find_user_by_email(&normalize_email(email))
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, UserError> {
        Ok(self.directory.list_users(offset, limit).await?)
    }

    pub async fn create(&self, input: NewUser) -> Result<User, UserError> {
        let email = normalize_email(&input.email);
        check_name("firstName", &input.first_name)?;
        check_name("lastName", &input.last_name)?;
        check_email(&email)?;
        check_password_policy(&input.password)?;
        if input.roles.is_empty() {
            return Err(UserError::Validation("At least one role is required".into()));
        }
        if self.directory.email_exists(&email).await? {
            return Err(UserError::EmailTaken);
        }

        let now = self.clock.now();
        let user = User {
            id: new_id(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email,
            password_hash: hash_password(&input.password)?,
            enabled: input.enabled,
            account_non_expired: input.account_non_expired,
            account_non_locked: input.account_non_locked,
            credentials_non_expired: input.credentials_non_expired,
            roles: input.roles,
            created_at: now,
            updated_at: now,
        };
        let user = self.directory.save_user(user).await.map_err(map_save_error)?;
        info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, UserError> {
        let mut user = self.get(id).await?;

        if let Some(first_name) = update.first_name {
            check_name("firstName", &first_name)?;
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            check_name("lastName", &last_name)?;
            user.last_name = last_name.trim().to_string();
        }
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            check_email(&email)?;
            user.email = email;
        }
        if let Some(password) = update.password {
            check_password_policy(&password)?;
            user.password_hash = hash_password(&password)?;
        }
        if let Some(enabled) = update.enabled {
            user.enabled = enabled;
        }
        if let Some(flag) = update.account_non_expired {
            user.account_non_expired = flag;
        }
        if let Some(flag) = update.account_non_locked {
            user.account_non_locked = flag;
        }
        if let Some(flag) = update.credentials_non_expired {
            user.credentials_non_expired = flag;
        }
        if let Some(roles) = update.roles {
            if roles.is_empty() {
                return Err(UserError::Validation("At least one role is required".into()));
            }
            user.roles = roles;
        }
        user.updated_at = self.clock.now();

        let user = self.directory.save_user(user).await.map_err(map_save_error)?;
        info!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// Delete a user together with its agents.
    pub async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        if !self.directory.delete_user(id).await? {
            return Err(UserError::NotFound);
        }
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Create the initial administrator unless the email is already taken.
    ///
    /// Returns `true` when a user was created.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<bool, UserError> {
        if self.directory.email_exists(&normalize_email(email)).await? {
            return Ok(false);
        }
        self.create(NewUser {
            first_name: "Admin".into(),
            last_name: "Sphynx".into(),
            email: email.into(),
            password: password.into(),
            enabled: true,
            account_non_expired: true,
            account_non_locked: true,
            credentials_non_expired: true,
            roles: BTreeSet::from([UserRole::User, UserRole::Admin]),
        })
        .await?;
        Ok(true)
    }
}
