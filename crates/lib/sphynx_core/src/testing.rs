//! Shared fixtures for unit tests.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{User, UserRole};
use crate::uuid::new_id;

/// Base64 of `sphynx-test-signing-key-32-bytes` (32 bytes, HS256).
pub const TEST_SECRET: &str = "c3BoeW54LXRlc3Qtc2lnbmluZy1rZXktMzItYnl0ZXM=";

/// A whole-second instant so token timestamps line up exactly.
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

/// An enabled `USER` with a placeholder hash.
pub fn sample_user(email: &str) -> User {
    let now = fixed_now();
    User {
        id: new_id(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: email.into(),
        password_hash: "$2b$10$placeholder".into(),
        enabled: true,
        account_non_expired: true,
        account_non_locked: true,
        credentials_non_expired: true,
        roles: BTreeSet::from([UserRole::User]),
        created_at: now,
        updated_at: now,
    }
}
