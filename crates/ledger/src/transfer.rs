//! Transfer validation and record construction.
//!
//! A transfer is decided in two phases:
//!
//! 1. This module validates the request against the involved accounts and
//!    produces a [`PreparedTransfer`] plus its immutable [`TransferRecord`]
//!    legs. Pure, deterministic, no I/O.
//! 2. The storage layer executes the prepared transfer as one atomic unit
//!    (balance mutations + log rows + idempotency receipt).
//!
//! For every completed internal transfer there are exactly two records —
//! a debit leg and a credit leg sharing a correlation id — whose signed
//! amounts sum to zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walletcore_core::{AccountId, Currency, DomainError, Money, TransferId, UserId};

use crate::account::Account;

/// Caller-supplied replay guard for a mutating ledger operation.
///
/// Retrying a timed-out transfer with the same key is safe; submitting the
/// same key twice mutates balances once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 128;

    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::validation("idempotency key must not be empty"));
        }
        if key.len() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "idempotency key longer than {} bytes",
                Self::MAX_LEN
            )));
        }
        if !key.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(DomainError::validation(
                "idempotency key must be printable ASCII",
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the money goes, as addressed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// A specific internal account.
    Account(AccountId),
    /// A user; credits that user's primary account.
    User(UserId),
    /// An opaque external recipient (settled outside the ledger).
    External(String),
}

/// The resolved movement of funds (user destinations already mapped to
/// their primary account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferFlow {
    /// Both legs inside the ledger.
    Internal {
        source: AccountId,
        destination: AccountId,
    },
    /// Debit here, settlement elsewhere; the leg stays pending until an
    /// external confirmation (out of scope) completes it.
    Outbound {
        source: AccountId,
        recipient: String,
    },
    /// Top-up with no internal source.
    Deposit { destination: AccountId },
}

impl TransferFlow {
    pub fn source(&self) -> Option<AccountId> {
        match self {
            TransferFlow::Internal { source, .. } | TransferFlow::Outbound { source, .. } => {
                Some(*source)
            }
            TransferFlow::Deposit { .. } => None,
        }
    }

    pub fn destination(&self) -> Option<AccountId> {
        match self {
            TransferFlow::Internal { destination, .. }
            | TransferFlow::Deposit { destination } => Some(*destination),
            TransferFlow::Outbound { .. } => None,
        }
    }
}

/// Debit or credit side of a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegDirection {
    Debit,
    Credit,
}

/// Settlement status of a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// The counterparty noted on a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counterparty {
    Account(AccountId),
    External(String),
}

/// Immutable fact of a balance movement (one leg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub account_id: AccountId,
    /// `None` for top-ups.
    pub counterparty: Option<Counterparty>,
    /// Signed minor units: negative on the debit leg, positive on credit.
    pub amount: i64,
    pub currency: Currency,
    pub direction: LegDirection,
    /// Shared across both legs of one transfer; this is the id returned to
    /// the caller as `transfer_id`.
    pub correlation_id: TransferId,
    pub idempotency_key: IdempotencyKey,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}

/// A fully validated transfer, ready for atomic execution.
///
/// Construction runs every precondition that does not require storage-side
/// state beyond the account snapshots handed in; only insufficient funds
/// and idempotency replay are left to the atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTransfer {
    pub correlation_id: TransferId,
    pub idempotency_key: IdempotencyKey,
    pub amount: Money,
    pub flow: TransferFlow,
}

impl PreparedTransfer {
    /// Validate an account-to-account transfer.
    pub fn internal(
        source: &Account,
        destination: &Account,
        amount: Money,
        idempotency_key: IdempotencyKey,
    ) -> Result<Self, DomainError> {
        ensure_positive(amount)?;
        source.ensure_active()?;
        destination.ensure_active()?;
        if source.id == destination.id {
            return Err(DomainError::validation(
                "source and destination are the same account",
            ));
        }
        ensure_currency(source, amount)?;
        if destination.currency != amount.currency() {
            return Err(DomainError::validation(format!(
                "destination account holds {}, transfer is {}",
                destination.currency,
                amount.currency()
            )));
        }
        Ok(Self {
            correlation_id: TransferId::new(),
            idempotency_key,
            amount,
            flow: TransferFlow::Internal {
                source: source.id,
                destination: destination.id,
            },
        })
    }

    /// Validate a transfer to an external recipient descriptor.
    pub fn outbound(
        source: &Account,
        recipient: impl Into<String>,
        amount: Money,
        idempotency_key: IdempotencyKey,
    ) -> Result<Self, DomainError> {
        ensure_positive(amount)?;
        source.ensure_active()?;
        ensure_currency(source, amount)?;
        let recipient = recipient.into();
        if recipient.trim().is_empty() {
            return Err(DomainError::validation("external recipient must not be empty"));
        }
        Ok(Self {
            correlation_id: TransferId::new(),
            idempotency_key,
            amount,
            flow: TransferFlow::Outbound {
                source: source.id,
                recipient,
            },
        })
    }

    /// Validate a top-up of an account.
    pub fn deposit(
        destination: &Account,
        amount: Money,
        idempotency_key: IdempotencyKey,
    ) -> Result<Self, DomainError> {
        ensure_positive(amount)?;
        destination.ensure_active()?;
        ensure_currency(destination, amount)?;
        Ok(Self {
            correlation_id: TransferId::new(),
            idempotency_key,
            amount,
            flow: TransferFlow::Deposit {
                destination: destination.id,
            },
        })
    }

    /// Build the immutable log records for this transfer.
    ///
    /// Internal transfers produce a debit and a credit leg whose signed
    /// amounts cancel; outbound transfers a single pending debit leg;
    /// deposits a single completed credit leg with no counterparty.
    pub fn legs(&self, now: DateTime<Utc>) -> Vec<TransferRecord> {
        let currency = self.amount.currency();
        let base = |account_id, counterparty, amount, direction, status| TransferRecord {
            id: TransferId::new(),
            account_id,
            counterparty,
            amount,
            currency,
            direction,
            correlation_id: self.correlation_id,
            idempotency_key: self.idempotency_key.clone(),
            status,
            created_at: now,
        };

        match &self.flow {
            TransferFlow::Internal { source, destination } => vec![
                base(
                    *source,
                    Some(Counterparty::Account(*destination)),
                    -self.amount.minor(),
                    LegDirection::Debit,
                    TransferStatus::Completed,
                ),
                base(
                    *destination,
                    Some(Counterparty::Account(*source)),
                    self.amount.minor(),
                    LegDirection::Credit,
                    TransferStatus::Completed,
                ),
            ],
            TransferFlow::Outbound { source, recipient } => vec![base(
                *source,
                Some(Counterparty::External(recipient.clone())),
                -self.amount.minor(),
                LegDirection::Debit,
                TransferStatus::Pending,
            )],
            TransferFlow::Deposit { destination } => vec![base(
                *destination,
                None,
                self.amount.minor(),
                LegDirection::Credit,
                TransferStatus::Completed,
            )],
        }
    }
}

fn ensure_positive(amount: Money) -> Result<(), DomainError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(DomainError::validation("amount must be positive"))
    }
}

fn ensure_currency(account: &Account, amount: Money) -> Result<(), DomainError> {
    if account.currency == amount.currency() {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "account holds {}, transfer is {}",
            account.currency,
            amount.currency()
        )))
    }
}
