//! `walletcore-ledger` — pure ledger domain logic.
//!
//! Accounts, transfer validation and leg construction, payment requests.
//! No I/O: the atomic execution of a transfer belongs to the storage layer
//! (`walletcore-infra`); this crate decides *what* a valid transfer is and
//! *which* immutable records it produces.

pub mod account;
pub mod request;
pub mod transfer;

pub use account::{Account, AccountStatus};
pub use request::{PaymentRequest, PaymentRequestStatus};
pub use transfer::{
    Counterparty, Destination, IdempotencyKey, LegDirection, PreparedTransfer, TransferFlow,
    TransferRecord, TransferStatus,
};
