//! `walletcore-infra` — storage and service wiring.
//!
//! Storage traits plus two families of implementations: in-memory
//! (dev/test) and Postgres (production, via sqlx). The ledger store is the
//! single writer path for balances: every mutation goes through its atomic
//! `execute`, which also appends the transaction-log legs and the
//! idempotency receipt in the same unit.

pub mod in_memory;
pub mod postgres;
pub mod stores;
pub mod sweeper;
pub mod transfer_service;

pub use stores::{
    Contact, LedgerStore, LedgerStoreError, LogPage, PaymentRequestStore,
    PaymentRequestStoreError, RecordPage, SessionResolver, SessionStore, TransferReceipt,
    UserStore, UserStoreError,
};
pub use sweeper::spawn_sweeper;
pub use transfer_service::{TransferError, TransferService};
