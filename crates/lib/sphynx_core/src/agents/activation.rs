//! Agent activation tokens.
//!
//! Opaque random strings, not signed credentials. Uniqueness is enforced by
//! the store; generation only has to make collisions improbable.

use rand::{CryptoRng, Rng};

/// Length of a generated activation token.
pub const ACTIVATION_TOKEN_LEN: usize = 32;

/// Characters an activation token is drawn from.
pub const ACTIVATION_TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+[]{};:,.?";

/// Generate a fresh token from the thread-local CSPRNG.
pub fn generate_activation_token() -> String {
    generate_with(&mut rand::rng())
}

/// Generate a token from the given cryptographically secure generator.
pub fn generate_with<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> String {
    (0..ACTIVATION_TOKEN_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ACTIVATION_TOKEN_ALPHABET.len());
            char::from(ACTIVATION_TOKEN_ALPHABET[idx])
        })
        .collect()
}
