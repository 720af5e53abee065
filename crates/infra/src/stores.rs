//! Storage traits.
//!
//! These are **infrastructure errors and contracts** (storage, atomicity,
//! replay detection) as opposed to domain errors (validation, invariants),
//! which are resolved before any store is touched.
//!
//! ## Atomicity
//!
//! `LedgerStore::execute` runs the whole transfer — conditional debit,
//! credit, both transaction-log legs, and the idempotency receipt — as one
//! all-or-nothing unit. No partial balance change is ever observable, and
//! no other component may mutate a balance directly.
//!
//! ## Idempotency
//!
//! Receipts are stored under the idempotency key with a uniqueness
//! guarantee at the storage layer. Replaying a committed key returns the
//! original receipt flagged `replayed`, with no further mutation — also
//! under concurrent replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use walletcore_auth::{Session, SessionToken};
use walletcore_core::{AccountId, ContactId, Currency, PaymentRequestId, TransferId, UserId};
use walletcore_ledger::{
    Account, IdempotencyKey, PaymentRequest, PreparedTransfer, TransferRecord,
};

/// Ledger store operation error.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("account not found")]
    AccountNotFound,

    #[error("account is frozen")]
    AccountFrozen,

    /// The debit would take the balance below its floor. A business
    /// outcome, not a system fault; nothing was mutated.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Storage is unavailable or the unit was aborted mid-flight.
    /// Retryable by the caller with the **same** idempotency key.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// The authoritative outcome of an executed transfer.
///
/// Persisted in the same atomic unit as the transfer itself so that a
/// replay can return exactly what the first execution returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// The correlation id shared by the transfer's legs.
    pub transfer_id: TransferId,
    pub source_account_id: Option<AccountId>,
    pub destination_account_id: Option<AccountId>,
    /// Post-transfer balance of the source, when internal (minor units).
    pub source_balance: Option<i64>,
    /// Post-transfer balance of the destination, when internal.
    pub destination_balance: Option<i64>,
    pub amount: i64,
    pub currency: Currency,
    /// True when this call was answered from the idempotency cache.
    /// Never persisted as true.
    #[serde(default, skip_serializing)]
    pub replayed: bool,
}

/// Pagination request for the transaction log.
#[derive(Debug, Clone, Copy)]
pub struct LogPage {
    pub limit: u32,
    /// Exclusive upper bound: records strictly older than this id.
    pub cursor: Option<TransferId>,
}

impl LogPage {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn new(limit: Option<u32>, cursor: Option<TransferId>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            cursor,
        }
    }
}

impl Default for LogPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of the transaction log, newest first.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub items: Vec<TransferRecord>,
    /// Pass back as the next request's cursor; `None` when exhausted.
    pub next_cursor: Option<TransferId>,
}

/// Balance storage + atomic transfer execution + transaction log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -- account store --------------------------------------------------

    async fn create_account(&self, account: Account) -> Result<Account, LedgerStoreError>;

    async fn account(&self, id: AccountId) -> Result<Account, LedgerStoreError>;

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerStoreError>;

    /// The owner's default account (transfer destination for user-addressed
    /// transfers).
    async fn primary_account_of(&self, owner: UserId) -> Result<Account, LedgerStoreError>;

    /// Soft removal; the account keeps its history and balance.
    async fn freeze_account(&self, id: AccountId) -> Result<Account, LedgerStoreError>;

    /// Atomic conditional balance adjustment: applies `delta_minor` only if
    /// the resulting balance stays at or above `min_balance`. One
    /// conditional write at the storage layer — never read-compute-write
    /// across round trips.
    async fn adjust_balance(
        &self,
        id: AccountId,
        delta_minor: i64,
        min_balance: i64,
    ) -> Result<Account, LedgerStoreError>;

    // -- transfer unit --------------------------------------------------

    /// Execute a validated transfer as one atomic unit.
    async fn execute(&self, prepared: &PreparedTransfer)
        -> Result<TransferReceipt, LedgerStoreError>;

    /// Look up the committed receipt for a key, if any. Read-only; used to
    /// answer replays without constructing a new transfer.
    async fn receipt_for(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransferReceipt>, LedgerStoreError>;

    // -- transaction log ------------------------------------------------

    /// Page through an account's records, newest first (keyset cursor on
    /// the time-ordered record id).
    async fn list_records(
        &self,
        account: AccountId,
        page: LogPage,
    ) -> Result<RecordPage, LedgerStoreError>;
}

/// User store operation error.
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user not found")]
    NotFound,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("username already taken")]
    DuplicateUsername,

    #[error("contact already saved")]
    DuplicateContact,

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Identity persistence (unique email/username enforced here).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        user: walletcore_auth::User,
    ) -> Result<walletcore_auth::User, UserStoreError>;

    async fn user_by_id(&self, id: UserId) -> Result<walletcore_auth::User, UserStoreError>;

    async fn user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<walletcore_auth::User>, UserStoreError>;

    async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<walletcore_auth::User>, UserStoreError>;

    // -- contacts (saved recipients) ------------------------------------

    async fn contacts_for(&self, user: UserId) -> Result<Vec<Contact>, UserStoreError>;

    async fn add_contact(&self, contact: Contact) -> Result<Contact, UserStoreError>;
}

/// A saved recipient in a user's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub user_id: UserId,
    pub name: String,
    /// Username of an existing user; validated against the user store
    /// before insertion.
    pub username: String,
}

/// Session persistence with TTL semantics.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<(), LedgerStoreError>;

    async fn get(&self, token: &SessionToken) -> Result<Option<Session>, LedgerStoreError>;

    /// Revocation is a hard delete; a revoked token can never resolve again.
    async fn revoke(&self, token: &SessionToken) -> Result<(), LedgerStoreError>;

    /// Remove sessions past their expiry. Returns the number purged.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerStoreError>;
}

/// Adapter that turns any [`SessionStore`] into the [`SessionGateway`] the
/// API layer authenticates through: unknown and revoked tokens resolve the
/// same way, expiry is validated on every resolve.
pub struct SessionResolver<S: ?Sized> {
    store: std::sync::Arc<S>,
}

impl<S: ?Sized> SessionResolver<S> {
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: SessionStore + ?Sized> walletcore_auth::SessionGateway for SessionResolver<S> {
    async fn resolve(&self, token: &SessionToken) -> Result<UserId, walletcore_auth::AuthError> {
        let session = self
            .store
            .get(token)
            .await
            .map_err(|e| walletcore_auth::AuthError::Store(e.to_string()))?
            .ok_or(walletcore_auth::AuthError::Unauthenticated)?;
        walletcore_auth::validate_session(&session, Utc::now())
    }
}

/// Payment request store error.
#[derive(Debug, Error)]
pub enum PaymentRequestStoreError {
    #[error("payment request not found")]
    NotFound,

    #[error("request already paid")]
    AlreadyPaid,

    #[error("request has expired")]
    Expired,

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Payment request persistence.
///
/// `mark_paid` is a conditional state transition that succeeds exactly once
/// per request, which is what makes the pay flow race-safe: the transition
/// is claimed first, then the ledger transfer runs, with a compensating
/// reset back to pending if that transfer fails.
#[async_trait]
pub trait PaymentRequestStore: Send + Sync {
    async fn create(&self, request: PaymentRequest)
        -> Result<PaymentRequest, PaymentRequestStoreError>;

    async fn get(&self, id: PaymentRequestId) -> Result<PaymentRequest, PaymentRequestStoreError>;

    /// The user's requests, with the lazy expiry policy applied on read.
    async fn list_for_user(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentRequest>, PaymentRequestStoreError>;

    /// Transition `pending -> paid`; fails with `AlreadyPaid`/`Expired`
    /// otherwise (expiring an overdue row as a side effect).
    async fn mark_paid(
        &self,
        id: PaymentRequestId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, PaymentRequestStoreError>;

    /// Compensation for a pay whose ledger transfer failed.
    async fn reset_to_pending(
        &self,
        id: PaymentRequestId,
    ) -> Result<(), PaymentRequestStoreError>;

    /// Background sweep: expire all overdue pending rows. Returns how many
    /// were expired.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, PaymentRequestStoreError>;
}
