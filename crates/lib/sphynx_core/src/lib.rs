//! # sphynx_core
//!
//! Core domain logic for Sphynx: typed bearer tokens for users, agent
//! activation and the background liveness sweep.

pub mod accounts;
pub mod agents;
pub mod auth;
pub mod clock;
pub mod config;
pub mod migrate;
pub mod models;
pub mod store;
pub mod users;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
