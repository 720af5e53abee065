//! Session/auth gateway: the boundary the HTTP layer authenticates through.

use async_trait::async_trait;
use thiserror::Error;

use walletcore_core::UserId;

use crate::session::SessionToken;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, unknown, or revoked credential.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Credential exists but its validity window has passed.
    #[error("session expired")]
    Expired,

    /// The backing store failed; retryable by the caller.
    #[error("session store unavailable: {0}")]
    Store(String),
}

/// Resolve a bearer credential to an authenticated user.
///
/// The transfer core depends on this only to authorize that the caller owns
/// the source account; issuance, hashing, and revocation live behind the
/// implementations in `walletcore-infra`.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn resolve(&self, token: &SessionToken) -> Result<UserId, AuthError>;
}
