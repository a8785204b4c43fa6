//! Persistence collaborators.
//!
//! The domain services only see [`UserDirectory`] and [`AgentStore`]. Two
//! implementations ship with the crate: [`memory::MemoryStore`] for tests and
//! single-process runs, and [`postgres::PgStore`] backed by sqlx.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Agent, AgentStatus, User};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (email, activation token).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced record does not exist (agent owner).
    #[error("Missing reference: {0}")]
    ForeignKey(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    /// A stored value could not be mapped back into the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// User records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Insert or replace. Fails with [`StoreError::Conflict`] when the email
    /// belongs to another user.
    async fn save_user(&self, user: User) -> Result<User, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn user_exists(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Users ordered by id.
    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError>;

    /// Remove a user and every agent it owns. Returns whether it existed.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Agent records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;

    async fn find_agent_by_activation_token(&self, token: &str)
    -> Result<Option<Agent>, StoreError>;

    /// Agents with `updated_at < before` whose status is not `exclude_status`.
    async fn find_stale_agents(
        &self,
        before: DateTime<Utc>,
        exclude_status: AgentStatus,
    ) -> Result<Vec<Agent>, StoreError>;

    /// Insert or replace one agent. The owner of an existing agent is never
    /// changed.
    ///
    /// Fails with [`StoreError::Conflict`] on a duplicate activation token and
    /// [`StoreError::ForeignKey`] when the owner does not exist.
    async fn save_agent(&self, agent: Agent) -> Result<Agent, StoreError>;

    /// Write `status` and `updated_at` of every given agent in one atomic
    /// batch and return how many rows changed.
    ///
    /// A row is written only while it is still stale: stored `updated_at <
    /// stale_before` and stored status different from the new one. Agents
    /// touched or deleted since they were read are skipped.
    async fn save_agents(
        &self,
        agents: &[Agent],
        stale_before: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Returns whether the agent existed.
    async fn delete_agent(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn agent_exists(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn find_agents_by_owner(&self, user_id: Uuid) -> Result<Vec<Agent>, StoreError>;

    async fn find_agents_by_name(&self, name: &str) -> Result<Vec<Agent>, StoreError>;

    /// Agents ordered by id.
    async fn list_agents(&self, offset: i64, limit: i64) -> Result<Vec<Agent>, StoreError>;

    /// Set `updated_at` only. Returns whether the agent exists.
    async fn touch_agent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}
