//! Liveness sweep: agents that stop touching their record are flipped back
//! to `INACTIVE`.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::models::AgentStatus;
use crate::store::AgentStore;

/// Sweep timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSettings {
    /// Time between sweeps.
    pub period: Duration,
    /// Silence tolerated before an agent counts as stale.
    pub freshness_window: Duration,
}

/// Periodically deactivates stale agents.
#[derive(Clone)]
pub struct LivenessSweeper {
    agents: Arc<dyn AgentStore>,
    clock: Arc<dyn Clock>,
    settings: LivenessSettings,
}

impl LivenessSweeper {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        clock: Arc<dyn Clock>,
        settings: LivenessSettings,
    ) -> Self {
        Self {
            agents,
            clock,
            settings,
        }
    }

    /// Run one sweep and return how many agents were deactivated.
    ///
    /// Failures are logged and reported as zero; the next tick retries.
    pub async fn sweep_once(&self) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = TimeDelta::from_std(self.settings.freshness_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            error!(window = ?self.settings.freshness_window, "Freshness window out of range");
            return 0;
        };

        let mut stale = match self.agents.find_stale_agents(cutoff, AgentStatus::Inactive).await {
            Ok(stale) => stale,
            Err(e) => {
                error!("Failed to query stale agents: {e}");
                return 0;
            }
        };
        if stale.is_empty() {
            debug!("No stale agents");
            return 0;
        }

        for agent in &mut stale {
            agent.status = AgentStatus::Inactive;
            agent.updated_at = now;
        }
        match self.agents.save_agents(&stale, cutoff).await {
            Ok(count) => {
                if count < stale.len() {
                    debug!(skipped = stale.len() - count, "Agents touched during sweep kept");
                }
                info!(count, "Deactivated stale agents");
                count
            }
            Err(e) => {
                error!(count = stale.len(), "Failed to deactivate stale agents: {e}");
                0
            }
        }
    }

    /// Sweep every `period` until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period = ?self.settings.period, "Liveness sweeper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            info!("Liveness sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Agent, AgentConfig};
    use crate::store::memory::MemoryStore;
    use crate::store::{StoreError, UserDirectory};
    use crate::testing::{fixed_now, sample_user};
    use crate::uuid::new_id;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    const SETTINGS: LivenessSettings = LivenessSettings {
        period: Duration::from_secs(5),
        freshness_window: Duration::from_secs(10),
    };

    async fn seed(store: &MemoryStore, status: AgentStatus, updated_at: DateTime<Utc>) -> Agent {
        let owner = store
            .save_user(sample_user(&format!("{}@example.com", new_id())))
            .await
            .unwrap();
        let agent = Agent {
            id: new_id(),
            name: "agent".into(),
            status,
            config: AgentConfig::default(),
            activation_token: new_id().to_string(),
            user_id: owner.id,
            created_at: updated_at,
            updated_at,
        };
        store.save_agent(agent).await.unwrap()
    }

    #[tokio::test]
    async fn stale_active_agent_is_deactivated_once() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(fixed_now());
        let agent = seed(&store, AgentStatus::Active, fixed_now() - TimeDelta::seconds(11)).await;
        let sweeper = LivenessSweeper::new(store.clone(), Arc::new(clock.clone()), SETTINGS);

        assert_eq!(sweeper.sweep_once().await, 1);
        let stored = store.find_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Inactive);
        assert_eq!(stored.updated_at, fixed_now());

        clock.advance(TimeDelta::seconds(30));
        assert_eq!(sweeper.sweep_once().await, 0);
        let again = store.find_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(again.updated_at, fixed_now());
    }

    #[tokio::test]
    async fn fresh_and_boundary_agents_are_untouched() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(fixed_now());
        let fresh = seed(&store, AgentStatus::Active, fixed_now() - TimeDelta::seconds(5)).await;
        let boundary = seed(&store, AgentStatus::Active, fixed_now() - TimeDelta::seconds(10)).await;
        let sweeper = LivenessSweeper::new(store.clone(), Arc::new(clock), SETTINGS);

        assert_eq!(sweeper.sweep_once().await, 0);
        for id in [fresh.id, boundary.id] {
            let stored = store.find_agent(id).await.unwrap().unwrap();
            assert_eq!(stored.status, AgentStatus::Active);
        }
    }

    #[tokio::test]
    async fn inactive_agents_are_not_rewritten() {
        let store = Arc::new(MemoryStore::new());
        let old = fixed_now() - TimeDelta::hours(1);
        let idle = seed(&store, AgentStatus::Inactive, old).await;
        let clock = ManualClock::new(fixed_now());
        let sweeper = LivenessSweeper::new(store.clone(), Arc::new(clock), SETTINGS);

        assert_eq!(sweeper.sweep_once().await, 0);
        let stored = store.find_agent(idle.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, old);
    }

    struct FailingStore;

    #[async_trait]
    impl AgentStore for FailingStore {
        async fn find_agent(&self, _: Uuid) -> Result<Option<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn find_agent_by_activation_token(&self, _: &str) -> Result<Option<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn find_stale_agents(
            &self,
            _: DateTime<Utc>,
            _: AgentStatus,
        ) -> Result<Vec<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn save_agent(&self, _: Agent) -> Result<Agent, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn save_agents(&self, _: &[Agent], _: DateTime<Utc>) -> Result<usize, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn delete_agent(&self, _: Uuid) -> Result<bool, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn agent_exists(&self, _: Uuid) -> Result<bool, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn find_agents_by_owner(&self, _: Uuid) -> Result<Vec<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn find_agents_by_name(&self, _: &str) -> Result<Vec<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn list_agents(&self, _: i64, _: i64) -> Result<Vec<Agent>, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
        async fn touch_agent(&self, _: Uuid, _: DateTime<Utc>) -> Result<bool, StoreError> {
            Err(StoreError::Corrupt("down".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let sweeper = LivenessSweeper::new(
            Arc::new(FailingStore),
            Arc::new(ManualClock::new(fixed_now())),
            SETTINGS,
        );
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    /// Delegates to a [`MemoryStore`] but lets the agent heartbeat right after
    /// the stale query returns.
    struct HeartbeatDuringSweep {
        inner: MemoryStore,
        agent_id: Uuid,
        heartbeat_at: DateTime<Utc>,
    }

    #[async_trait]
    impl AgentStore for HeartbeatDuringSweep {
        async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
            self.inner.find_agent(id).await
        }
        async fn find_agent_by_activation_token(&self, t: &str) -> Result<Option<Agent>, StoreError> {
            self.inner.find_agent_by_activation_token(t).await
        }
        async fn find_stale_agents(
            &self,
            before: DateTime<Utc>,
            exclude: AgentStatus,
        ) -> Result<Vec<Agent>, StoreError> {
            let stale = self.inner.find_stale_agents(before, exclude).await?;
            self.inner.touch_agent(self.agent_id, self.heartbeat_at).await?;
            Ok(stale)
        }
        async fn save_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
            self.inner.save_agent(agent).await
        }
        async fn save_agents(
            &self,
            agents: &[Agent],
            stale_before: DateTime<Utc>,
        ) -> Result<usize, StoreError> {
            self.inner.save_agents(agents, stale_before).await
        }
        async fn delete_agent(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.delete_agent(id).await
        }
        async fn agent_exists(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.agent_exists(id).await
        }
        async fn find_agents_by_owner(&self, id: Uuid) -> Result<Vec<Agent>, StoreError> {
            self.inner.find_agents_by_owner(id).await
        }
        async fn find_agents_by_name(&self, name: &str) -> Result<Vec<Agent>, StoreError> {
            self.inner.find_agents_by_name(name).await
        }
        async fn list_agents(&self, offset: i64, limit: i64) -> Result<Vec<Agent>, StoreError> {
            self.inner.list_agents(offset, limit).await
        }
        async fn touch_agent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
            self.inner.touch_agent(id, at).await
        }
    }

    #[tokio::test]
    async fn heartbeat_during_sweep_keeps_agent_active() {
        let inner = MemoryStore::new();
        let agent = seed(&inner, AgentStatus::Active, fixed_now() - TimeDelta::seconds(11)).await;
        let heartbeat_at = fixed_now() - TimeDelta::milliseconds(500);
        let store = Arc::new(HeartbeatDuringSweep {
            inner,
            agent_id: agent.id,
            heartbeat_at,
        });
        let sweeper =
            LivenessSweeper::new(store.clone(), Arc::new(ManualClock::new(fixed_now())), SETTINGS);

        assert_eq!(sweeper.sweep_once().await, 0);
        let stored = store.find_agent(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Active);
        assert_eq!(stored.updated_at, heartbeat_at);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_runs_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(fixed_now());
        let agent = seed(&store, AgentStatus::Active, fixed_now()).await;
        let cancel = CancellationToken::new();
        let handle = LivenessSweeper::new(store.clone(), Arc::new(clock.clone()), SETTINGS)
            .spawn(cancel.clone());

        // First tick fires immediately; the agent is still fresh.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            store.find_agent(agent.id).await.unwrap().unwrap().status,
            AgentStatus::Active
        );

        clock.advance(TimeDelta::seconds(11));
        tokio::time::sleep(SETTINGS.period).await;
        assert_eq!(
            store.find_agent(agent.id).await.unwrap().unwrap().status,
            AgentStatus::Inactive
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
