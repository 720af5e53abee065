//! Password hashing.
//!
//! bcrypt with its built-in per-hash salt. This replaces the single-round
//! unsalted SHA-256 scheme of the legacy backend; stored hashes carry the
//! cost factor, so the cost can be raised later without invalidating
//! existing credentials.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// An encoded bcrypt hash (`$2b$...`), never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn hash_password(plaintext: &str) -> Result<PasswordHash, PasswordError> {
    Ok(PasswordHash(bcrypt::hash(plaintext, bcrypt::DEFAULT_COST)?))
}

/// Verify a plaintext candidate against a stored hash.
///
/// A malformed stored hash verifies as false rather than erroring; callers
/// present the same "invalid email or password" either way.
pub fn verify_password(plaintext: &str, hash: &PasswordHash) -> bool {
    bcrypt::verify(plaintext, &hash.0).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        // Per-hash salt: equal inputs must not produce equal hashes.
        let a = hash_password("hunter2").unwrap();
        let b = hash_password("hunter2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_fails_closed() {
        let bogus = PasswordHash::from_encoded("not-a-bcrypt-hash");
        assert!(!verify_password("anything", &bogus));
    }
}
