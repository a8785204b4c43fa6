//! Password hashing via bcrypt, plus the password policy.

use std::sync::LazyLock;

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 20;
const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Checked when no account matches, so a miss costs the same bcrypt work as a hit.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("sphynx-no-such-account").ok());

/// Burn one bcrypt verification for a sign-in with no matching account.
/// Always fails.
pub fn verify_missing_account(password: &str) -> bool {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

/// 6–20 characters with at least one letter, one digit and one special character.
pub fn check_password_policy(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::ValidationError(format!(
            "Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARS.contains(c));
    if !(has_letter && has_digit && has_special) {
        return Err(AuthError::ValidationError(
            "Password must contain at least one letter, one number, and one special character"
                .into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("s3cret!", &hash).unwrap());
        assert!(!verify_password("wrong1!", &hash).unwrap());
    }

    #[test]
    fn verify_against_garbage_hash_errors() {
        assert!(verify_password("s3cret!", "not-a-hash").is_err());
    }

    #[test]
    fn missing_account_runs_a_real_verify_and_fails() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$2"));
        assert!(!verify_password("s3cret!", hash).unwrap());
        assert!(!verify_missing_account("s3cret!"));
        assert!(!verify_missing_account("sphynx-no-such-account"));
    }

    #[test]
    fn policy_accepts_mixed_password() {
        assert!(check_password_policy("abc12#").is_ok());
        assert!(check_password_policy("Sphynx-2024").is_ok());
    }

    #[test]
    fn policy_rejects_weak_passwords() {
        for weak in ["a1#", "abcdef", "123456", "abc123", "abc!!!", "a1#aaaaaaaaaaaaaaaaaaaa"] {
            assert!(
                matches!(check_password_policy(weak), Err(AuthError::ValidationError(_))),
                "accepted {weak:?}"
            );
        }
    }
}
