//! User identity model.
//!
//! # Invariants
//! - `email` and `username` are unique across the system (enforced by the
//!   user store).
//! - The password is stored only as a bcrypt hash.
//! - Every user owns exactly one primary account, created at signup.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use walletcore_core::{DomainError, UserId};

use crate::password::{hash_password, PasswordHash};

/// Public-facing wallet handle, e.g. `WLT-3F9A01BC77D2E410`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletHandle(String);

impl WalletHandle {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(16);
        for b in bytes {
            use core::fmt::Write;
            let _ = write!(hex, "{b:02X}");
        }
        Self(format!("WLT-{hex}"))
    }

    /// Wrap a handle read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WalletHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signup input, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub phone: Option<String>,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub wallet_id: WalletHandle,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Validate signup input and build the user record (hashes the password).
    pub fn register(input: NewUser) -> Result<Self, DomainError> {
        let email = input.email.trim().to_ascii_lowercase();
        if !looks_like_email(&email) {
            return Err(DomainError::validation("invalid email"));
        }
        let username = input.username.trim().to_string();
        if username.len() < 3 {
            return Err(DomainError::validation(
                "username must be at least 3 characters",
            ));
        }
        if !username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            return Err(DomainError::validation(
                "username may contain letters, digits, '_' and '.'",
            ));
        }
        if input.password.len() < 6 {
            return Err(DomainError::validation(
                "password must be at least 6 characters",
            ));
        }
        let display_name = input.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }

        let password_hash = hash_password(&input.password)
            .map_err(|e| DomainError::validation(format!("password rejected: {e}")))?;

        Ok(Self {
            id: UserId::new(),
            wallet_id: WalletHandle::generate(),
            email,
            username,
            display_name,
            phone: input.phone,
            password_hash,
            verified: false,
            created_at: Utc::now(),
        })
    }
}

/// Cheap shape check; deliverability is out of scope.
fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::verify_password;

    fn input() -> NewUser {
        NewUser {
            display_name: "Alex Morgan".to_string(),
            email: "Alex.Morgan@example.com".to_string(),
            username: "alex_morgan".to_string(),
            password: "demo-password".to_string(),
            phone: None,
        }
    }

    #[test]
    fn register_normalizes_email_and_hashes_password() {
        let user = User::register(input()).unwrap();
        assert_eq!(user.email, "alex.morgan@example.com");
        assert!(verify_password("demo-password", &user.password_hash));
        assert!(user.wallet_id.as_str().starts_with("WLT-"));
        assert_eq!(user.wallet_id.as_str().len(), 20);
        assert!(!user.verified);
    }

    #[test]
    fn register_rejects_bad_input() {
        let mut bad = input();
        bad.email = "no-at-sign".to_string();
        assert!(User::register(bad).is_err());

        let mut bad = input();
        bad.username = "ab".to_string();
        assert!(User::register(bad).is_err());

        let mut bad = input();
        bad.username = "has space".to_string();
        assert!(User::register(bad).is_err());

        let mut bad = input();
        bad.password = "short".to_string();
        assert!(User::register(bad).is_err());

        let mut bad = input();
        bad.display_name = "   ".to_string();
        assert!(User::register(bad).is_err());
    }
}
