//! In-memory store.
//!
//! Locks are always taken users first, then agents.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AgentStore, StoreError, UserDirectory};
use crate::models::{Agent, AgentStatus, User};

/// Process-local implementation of both store traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    agents: RwLock<HashMap<Uuid, Agent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T: Clone>(mut items: Vec<T>, key: impl Fn(&T) -> Uuid, offset: i64, limit: i64) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(StoreError::Conflict(format!("email {} is taken", user.email)));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.users.read().await.values().any(|u| u.email == email))
    }

    async fn user_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.read().await.contains_key(&id))
    }

    async fn list_users(&self, offset: i64, limit: i64) -> Result<Vec<User>, StoreError> {
        let users: Vec<User> = self.users.read().await.values().cloned().collect();
        Ok(page(users, |u| u.id, offset, limit))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let mut agents = self.agents.write().await;
        if users.remove(&id).is_none() {
            return Ok(false);
        }
        agents.retain(|_, agent| agent.user_id != id);
        Ok(true)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.read().await.get(&id).cloned())
    }

    async fn find_agent_by_activation_token(
        &self,
        token: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let agents = self.agents.read().await;
        Ok(agents.values().find(|a| a.activation_token == token).cloned())
    }

    async fn find_stale_agents(
        &self,
        before: DateTime<Utc>,
        exclude_status: AgentStatus,
    ) -> Result<Vec<Agent>, StoreError> {
        let agents = self.agents.read().await;
        let mut stale: Vec<Agent> = agents
            .values()
            .filter(|a| a.updated_at < before && a.status != exclude_status)
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.id);
        Ok(stale)
    }

    async fn save_agent(&self, mut agent: Agent) -> Result<Agent, StoreError> {
        let users = self.users.read().await;
        let mut agents = self.agents.write().await;

        if let Some(existing) = agents.get(&agent.id) {
            agent.user_id = existing.user_id;
            agent.created_at = existing.created_at;
        } else if !users.contains_key(&agent.user_id) {
            return Err(StoreError::ForeignKey(format!("user {} does not exist", agent.user_id)));
        }
        if agents
            .values()
            .any(|a| a.activation_token == agent.activation_token && a.id != agent.id)
        {
            return Err(StoreError::Conflict("activation token is taken".into()));
        }
        agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn save_agents(
        &self,
        batch: &[Agent],
        stale_before: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut agents = self.agents.write().await;
        let mut written = 0;
        for update in batch {
            let Some(stored) = agents.get_mut(&update.id) else {
                continue;
            };
            if stored.updated_at >= stale_before || stored.status == update.status {
                continue;
            }
            stored.status = update.status;
            stored.updated_at = update.updated_at;
            written += 1;
        }
        Ok(written)
    }

    async fn delete_agent(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.agents.write().await.remove(&id).is_some())
    }

    async fn agent_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.agents.read().await.contains_key(&id))
    }

    async fn find_agents_by_owner(&self, user_id: Uuid) -> Result<Vec<Agent>, StoreError> {
        let agents = self.agents.read().await;
        let owned: Vec<Agent> = agents.values().filter(|a| a.user_id == user_id).cloned().collect();
        Ok(page(owned, |a| a.id, 0, i64::MAX))
    }

    async fn find_agents_by_name(&self, name: &str) -> Result<Vec<Agent>, StoreError> {
        let agents = self.agents.read().await;
        let named: Vec<Agent> = agents.values().filter(|a| a.name == name).cloned().collect();
        Ok(page(named, |a| a.id, 0, i64::MAX))
    }

    async fn list_agents(&self, offset: i64, limit: i64) -> Result<Vec<Agent>, StoreError> {
        let agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        Ok(page(agents, |a| a.id, offset, limit))
    }

    async fn touch_agent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut agents = self.agents.write().await;
        match agents.get_mut(&id) {
            Some(agent) => {
                agent.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
