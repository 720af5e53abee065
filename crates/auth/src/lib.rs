//! `walletcore-auth` — authentication boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: password
//! hashing, opaque session tokens with expiry, the user identity model,
//! and the gateway trait the API layer authenticates through.

pub mod gateway;
pub mod password;
pub mod session;
pub mod user;

pub use gateway::{AuthError, SessionGateway};
pub use password::{hash_password, verify_password, PasswordHash};
pub use session::{Session, SessionToken, validate_session};
pub use user::{NewUser, User, WalletHandle};
