//! Agent domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Inactive,
    Active,
}

impl AgentStatus {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Inactive => "INACTIVE",
            AgentStatus::Active => "ACTIVE",
        }
    }

    /// Parse the storage representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INACTIVE" => Some(AgentStatus::Inactive),
            "ACTIVE" => Some(AgentStatus::Active),
            _ => None,
        }
    }
}

/// Metric collection settings pushed to an agent.
///
/// Stored as a JSON document alongside the agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub cpu_metrics_count: i32,
    pub memory_metrics_count: i32,
    pub disk_metrics_count: i32,
    /// Reporting interval in seconds.
    pub interval: i32,
}

impl AgentConfig {
    /// Check value ranges: counts must be zero or positive, interval at least 1.
    pub fn validate(&self) -> Result<(), String> {
        let counts = [
            ("cpuMetricsCount", self.cpu_metrics_count),
            ("memoryMetricsCount", self.memory_metrics_count),
            ("diskMetricsCount", self.disk_metrics_count),
        ];
        for (field, value) in counts {
            if value < 0 {
                return Err(format!("{field} must be zero or positive"));
            }
        }
        if self.interval < 1 {
            return Err("interval must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cpu_metrics_count: 0,
            memory_metrics_count: 0,
            disk_metrics_count: 0,
            interval: 1,
        }
    }
}

/// A monitored remote process owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    pub config: AgentConfig,
    /// Opaque secret presented once by the agent to activate itself.
    pub activation_token: String,
    /// Owning user. Immutable after creation.
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Last write to the record; doubles as the liveness timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_storage_names() {
        assert_eq!(AgentStatus::parse("ACTIVE"), Some(AgentStatus::Active));
        assert_eq!(
            AgentStatus::parse(AgentStatus::Inactive.as_str()),
            Some(AgentStatus::Inactive)
        );
        assert_eq!(AgentStatus::parse("active"), None);
    }

    #[test]
    fn config_uses_camel_case_json() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "cpuMetricsCount": 2,
            "memoryMetricsCount": 1,
            "diskMetricsCount": 0,
            "interval": 5
        }))
        .unwrap();
        assert_eq!(config.cpu_metrics_count, 2);
        assert_eq!(config.interval, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_negative_counts_and_zero_interval() {
        let negative = AgentConfig {
            disk_metrics_count: -1,
            ..AgentConfig::default()
        };
        assert!(negative.validate().unwrap_err().contains("diskMetricsCount"));

        let zero_interval = AgentConfig {
            interval: 0,
            ..AgentConfig::default()
        };
        assert!(zero_interval.validate().is_err());
    }
}
