//! Password hashing and verification using argon2id.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::OnceLock;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// A malformed stored hash is an error; a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Runs a full verification against a throwaway hash, for logins whose
/// email has no account. Keeps that path as slow as a wrong password.
pub fn verify_against_dummy(password: &str) -> bool {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    let Some(hash) = DUMMY_HASH.get_or_init(|| hash_password("no-such-account").ok()) else {
        return false;
    };
    verify_password(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MIN_PASSWORD_LEN;

    #[test]
    fn same_password_hashes_differently_per_account() {
        let first = hash_password("holiday-sale-2024").unwrap();
        let second = hash_password("holiday-sale-2024").unwrap();
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(verify_password("holiday-sale-2024", &first).unwrap());
        assert!(verify_password("holiday-sale-2024", &second).unwrap());
    }

    #[test]
    fn stored_hash_does_not_leak_the_password() {
        let hash = hash_password("marketer-pass").unwrap();
        assert!(!hash.contains("marketer-pass"));
    }

    #[test]
    fn shortest_allowed_password_round_trips() {
        let password = "x".repeat(MIN_PASSWORD_LEN);
        let hash = hash_password(&password).unwrap();
        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&password[1..], &hash).unwrap());
    }

    #[test]
    fn non_ascii_passwords_are_compared_exactly() {
        let hash = hash_password("Ünïcödé-パス").unwrap();
        assert!(verify_password("Ünïcödé-パス", &hash).unwrap());
        assert!(!verify_password("ünïcödé-パス", &hash).unwrap());
    }

    #[test]
    fn stored_hash_that_is_not_phc_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn dummy_verification_rejects_real_passwords() {
        assert!(!verify_against_dummy("hunter22"));
        assert!(!verify_against_dummy(""));
        // The throwaway hash is real, so the work was actually done.
        assert!(verify_against_dummy("no-such-account"));
    }
}
