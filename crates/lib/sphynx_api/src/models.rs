//! Request and response bodies.
//!
//! JSON field names are camelCase.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sphynx_core::models::{Agent, AgentConfig, AgentStatus, User, UserRole};
use uuid::Uuid;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 20;
/// Largest page size a client may request.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetTokenQuery {
    pub reset_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

/// Session token plus the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
    pub user: UserResponse,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub enabled: bool,
    pub account_non_expired: bool,
    pub account_non_locked: bool,
    pub credentials_non_expired: bool,
    pub roles: BTreeSet<UserRole>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            enabled: user.enabled,
            account_non_expired: user.account_non_expired,
            account_non_locked: user.account_non_locked,
            credentials_non_expired: user.credentials_non_expired,
            roles: user.roles,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// `GET /user/get` filters. With neither `userId` nor `email` the users are
/// listed page by page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl UserQuery {
    pub fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            size: self.size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

fn default_true() -> bool {
    true
}

fn default_roles() -> BTreeSet<UserRole> {
    BTreeSet::from([UserRole::User])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub account_non_expired: bool,
    #[serde(default = "default_true")]
    pub account_non_locked: bool,
    #[serde(default = "default_true")]
    pub credentials_non_expired: bool,
    #[serde(default = "default_roles")]
    pub roles: BTreeSet<UserRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
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

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub id: Uuid,
    pub agent_name: String,
    pub agent_status: AgentStatus,
    pub agent_config: AgentConfig,
    pub activation_token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            agent_name: agent.name,
            agent_status: agent.status,
            agent_config: agent.config,
            activation_token: agent.activation_token,
            user_id: agent.user_id,
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}

/// `GET /agent/get` filters, tried in order: `agentId`, `agentName`,
/// `userId`, then the full paged list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    pub agent_id: Option<Uuid>,
    pub agent_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl AgentQuery {
    pub fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            size: self.size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdQuery {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdQuery {
    pub agent_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    /// Owner. Defaults to the caller; only admins may name someone else.
    pub user_id: Option<Uuid>,
    pub agent_name: String,
    #[serde(default)]
    pub agent_config: AgentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    pub agent_name: Option<String>,
    pub agent_config: Option<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateAgentRequest {
    pub activation_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationTokenResponse {
    pub activation_token: String,
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Zero-based page number and page size.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageQuery {
    /// `(page, size, offset)` after clamping to sane bounds.
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(0).max(0);
        let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, size, page.saturating_mul(size))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
}
