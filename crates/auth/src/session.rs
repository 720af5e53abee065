//! Opaque bearer sessions.
//!
//! Tokens are 32 random bytes, hex encoded, persisted with a TTL by the
//! storage layer. Opaque (rather than signed) tokens keep revocation a
//! simple row delete; an expiry sweep purges stale rows in the background.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use walletcore_core::UserId;

use crate::gateway::AuthError;

/// Default session lifetime.
pub const DEFAULT_TTL_MINUTES: i64 = 60 * 24;

/// An opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh 256-bit token from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(64);
        for b in bytes {
            use core::fmt::Write;
            let _ = write!(hex, "{b:02x}");
        }
        Self(hex)
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A persisted session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn issue(user_id: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: SessionToken::generate(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Deterministically validate a session's time window.
///
/// Note: this validates the record only. Lookup and revocation state live
/// in the session store.
pub fn validate_session(session: &Session, now: DateTime<Utc>) -> Result<UserId, AuthError> {
    if session.expires_at <= session.created_at {
        return Err(AuthError::Unauthenticated);
    }
    if session.is_expired(now) {
        return Err(AuthError::Expired);
    }
    Ok(session.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_hex() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn validation_respects_the_time_window() {
        let session = Session::issue(UserId::new(), Duration::minutes(10));
        assert_eq!(
            validate_session(&session, Utc::now()).unwrap(),
            session.user_id
        );
        let later = Utc::now() + Duration::minutes(11);
        assert!(matches!(
            validate_session(&session, later),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn inverted_time_window_is_rejected() {
        let mut session = Session::issue(UserId::new(), Duration::minutes(10));
        session.expires_at = session.created_at - Duration::minutes(1);
        assert!(validate_session(&session, Utc::now()).is_err());
    }
}
