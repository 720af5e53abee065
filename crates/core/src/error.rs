//! Error model shared by the wallet domain crates.

use thiserror::Error;

/// A deterministic domain failure.
///
/// Everything here is a business-rule outcome: bad input, a missing or
/// foreign resource, a uniqueness clash. Storage and transport failures
/// are modelled by the infra layer, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input violated a validation rule (malformed amount, frozen account,
    /// self-addressed transfer, and so on).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier string did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The resource does not exist, or is not visible to the caller.
    #[error("not found")]
    NotFound,

    /// The operation lost to an earlier one (duplicate signup, request
    /// already paid).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller is authenticated but does not own the resource.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_reason() {
        let err = DomainError::validation("amount must be positive");
        assert_eq!(err.to_string(), "validation failed: amount must be positive");
        assert_eq!(DomainError::NotFound.to_string(), "not found");
    }
}
