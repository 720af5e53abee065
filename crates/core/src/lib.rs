//! `walletcore-core` — identifiers, money, and errors shared by every
//! wallet crate. Pure domain types only; no infrastructure concerns.

pub mod error;
pub mod id;
pub mod money;

pub use error::DomainError;
pub use id::{AccountId, ContactId, PaymentRequestId, TransferId, UserId};
pub use money::{Currency, Money, MoneyError};
