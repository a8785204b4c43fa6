//! Agents: activation tokens, lifecycle transitions and the liveness sweep.

pub mod activation;
pub mod lifecycle;
pub mod liveness;

use thiserror::Error;

use crate::store::StoreError;

/// Agent lifecycle errors.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent not found")]
    AgentNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Agent name may only contain letters, digits, '_' and '-'")]
    InvalidAgentName,

    #[error("Invalid agent config: {0}")]
    InvalidConfig(String),

    #[error("Could not allocate a unique activation token")]
    TokenExhausted,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A name is valid when non-empty and made of `[A-Za-z0-9_-]` only.
pub fn validate_agent_name(name: &str) -> Result<(), AgentError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(AgentError::InvalidAgentName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_names() {
        assert!(validate_agent_name("ok_Name-1").is_ok());
        assert!(matches!(
            validate_agent_name("bad name!"),
            Err(AgentError::InvalidAgentName)
        ));
        assert!(matches!(validate_agent_name(""), Err(AgentError::InvalidAgentName)));
        assert!(validate_agent_name("ünïcode").is_err());
    }
}
