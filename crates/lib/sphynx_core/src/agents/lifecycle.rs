//! Agent lifecycle: creation, activation, token refresh, update and removal.
//!
//! Status moves `INACTIVE -> ACTIVE` only through [`AgentLifecycle::activate_agent`];
//! the reverse transition belongs to the liveness sweep.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::activation::generate_activation_token;
use super::{AgentError, validate_agent_name};
use crate::clock::Clock;
use crate::models::{Agent, AgentConfig, AgentStatus};
use crate::store::{AgentStore, StoreError, UserDirectory};
use crate::uuid::new_id;

/// Attempts at drawing an unused activation token before giving up.
const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Partial agent update. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub config: Option<AgentConfig>,
}

/// Drives agent state transitions.
///
/// Activation, refresh, update and delete of one agent are serialized by a
/// per-agent async mutex. Clones share the lock table; an entry lives only
/// while some operation holds or waits for it.
#[derive(Clone)]
pub struct AgentLifecycle {
    agents: Arc<dyn AgentStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    locks: Arc<LockTable>,
}

type LockTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Holds one agent's mutex. On drop the table entry is removed unless
/// another task still holds or waits on it.
struct AgentGuard {
    locks: Arc<LockTable>,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AgentGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.id, |_, m| Arc::strong_count(m) == 1);
    }
}

fn map_store_error(err: StoreError) -> AgentError {
    match err {
        StoreError::ForeignKey(_) => AgentError::UserNotFound,
        other => AgentError::Store(other),
    }
}

impl AgentLifecycle {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agents,
            users,
            clock,
            locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock_agent(&self, id: Uuid) -> AgentGuard {
        let mutex = self.locks.entry(id).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        AgentGuard {
            locks: self.locks.clone(),
            id,
            guard: Some(guard),
        }
    }

    /// Create an `INACTIVE` agent owned by `owner_id`.
    pub async fn create_agent(
        &self,
        owner_id: Uuid,
        name: &str,
        config: AgentConfig,
    ) -> Result<Agent, AgentError> {
        validate_agent_name(name)?;
        config.validate().map_err(AgentError::InvalidConfig)?;
        if !self.users.user_exists(owner_id).await? {
            return Err(AgentError::UserNotFound);
        }

        let now = self.clock.now();
        let agent = Agent {
            id: new_id(),
            name: name.to_string(),
            status: AgentStatus::Inactive,
            config,
            activation_token: String::new(),
            user_id: owner_id,
            created_at: now,
            updated_at: now,
        };
        let saved = self.save_with_fresh_token(agent).await?;
        info!(agent_id = %saved.id, user_id = %owner_id, "Agent created");
        Ok(saved)
    }

    /// Consume an activation token and mark its agent `ACTIVE`.
    ///
    /// The token stays on the record; it is replaced only by an explicit
    /// refresh.
    pub async fn activate_agent(&self, token: &str) -> Result<Agent, AgentError> {
        if token.is_empty() {
            return Err(AgentError::AgentNotFound);
        }
        let found = self
            .agents
            .find_agent_by_activation_token(token)
            .await?
            .ok_or(AgentError::AgentNotFound)?;

        let _guard = self.lock_agent(found.id).await;

        // The token may have been rotated away while we waited.
        let mut agent = self
            .agents
            .find_agent(found.id)
            .await?
            .filter(|a| a.activation_token == token)
            .ok_or(AgentError::AgentNotFound)?;

        agent.status = AgentStatus::Active;
        agent.updated_at = self.clock.now();
        let saved = self.agents.save_agent(agent).await.map_err(map_store_error)?;
        info!(agent_id = %saved.id, "Agent activated");
        Ok(saved)
    }

    /// Replace the activation token, whatever the agent's status. Returns the
    /// new token.
    pub async fn refresh_activation_token(&self, agent_id: Uuid) -> Result<String, AgentError> {
        let _guard = self.lock_agent(agent_id).await;

        let agent = self
            .agents
            .find_agent(agent_id)
            .await?
            .ok_or(AgentError::AgentNotFound)?;
        let saved = self.save_with_fresh_token(agent).await?;
        info!(agent_id = %agent_id, "Activation token refreshed");
        Ok(saved.activation_token)
    }

    /// Apply a partial update. A new name is validated like on creation.
    pub async fn update_agent(
        &self,
        agent_id: Uuid,
        update: AgentUpdate,
    ) -> Result<Agent, AgentError> {
        if let Some(name) = &update.name {
            validate_agent_name(name)?;
        }
        if let Some(config) = &update.config {
            config.validate().map_err(AgentError::InvalidConfig)?;
        }

        let _guard = self.lock_agent(agent_id).await;

        let mut agent = self
            .agents
            .find_agent(agent_id)
            .await?
            .ok_or(AgentError::AgentNotFound)?;
        if let Some(name) = update.name {
            agent.name = name;
        }
        if let Some(config) = update.config {
            agent.config = config;
        }
        agent.updated_at = self.clock.now();
        let saved = self.agents.save_agent(agent).await.map_err(map_store_error)?;
        debug!(agent_id = %agent_id, "Agent updated");
        Ok(saved)
    }

    pub async fn delete_agent(&self, agent_id: Uuid) -> Result<(), AgentError> {
        let deleted = {
            let _guard = self.lock_agent(agent_id).await;
            self.agents.delete_agent(agent_id).await?
        };
        if !deleted {
            return Err(AgentError::AgentNotFound);
        }
        info!(agent_id = %agent_id, "Agent deleted");
        Ok(())
    }

    /// Mark the agent as alive now. Status is left unchanged.
    pub async fn record_heartbeat(&self, agent_id: Uuid) -> Result<(), AgentError> {
        if self.agents.touch_agent(agent_id, self.clock.now()).await? {
            Ok(())
        } else {
            Err(AgentError::AgentNotFound)
        }
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Agent, AgentError> {
        self.agents
            .find_agent(agent_id)
            .await?
            .ok_or(AgentError::AgentNotFound)
    }

    pub async fn agents_by_name(&self, name: &str) -> Result<Vec<Agent>, AgentError> {
        Ok(self.agents.find_agents_by_name(name).await?)
    }

    pub async fn agents_for_owner(&self, owner_id: Uuid) -> Result<Vec<Agent>, AgentError> {
        Ok(self.agents.find_agents_by_owner(owner_id).await?)
    }

    pub async fn list_agents(&self, offset: i64, limit: i64) -> Result<Vec<Agent>, AgentError> {
        Ok(self.agents.list_agents(offset, limit).await?)
    }

    /// Persist `agent` under a newly drawn activation token, redrawing on
    /// collision.
    async fn save_with_fresh_token(&self, mut agent: Agent) -> Result<Agent, AgentError> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = generate_activation_token();
            if self
                .agents
                .find_agent_by_activation_token(&token)
                .await?
                .is_some()
            {
                debug!(attempt, "Activation token collision, redrawing");
                continue;
            }
            agent.activation_token = token;
            agent.updated_at = self.clock.now();
            match self.agents.save_agent(agent.clone()).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::Conflict(_)) => {
                    debug!(attempt, "Activation token taken concurrently, redrawing");
                }
                Err(e) => return Err(map_store_error(e)),
            }
        }
        Err(AgentError::TokenExhausted)
    }
}
