//! Domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes in `sphynx_api::models`.

pub mod agent;
pub mod auth;
pub mod user;

pub use agent::{Agent, AgentConfig, AgentStatus};
pub use auth::{TokenClaims, TokenKind};
pub use user::{User, UserRole};
