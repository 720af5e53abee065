//! Balance-holding accounts ("cards" in the mobile app).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use walletcore_core::{AccountId, Currency, DomainError, Money, UserId};

/// Account lifecycle status.
///
/// Accounts are never hard-deleted; freezing is the only removal, which
/// preserves the audit trail of the transaction log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
}

/// One balance bucket owned by a user.
///
/// # Invariants
/// - `balance >= 0` after every committed operation.
/// - `currency` is fixed for the lifetime of the account.
/// - Mutation happens only through the transfer service's atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: UserId,
    /// Display name, e.g. "Groceries".
    pub title: String,
    /// Balance in minor units of `currency`.
    pub balance: i64,
    pub currency: Currency,
    pub status: AccountStatus,
    /// Whether this is the owner's default account (transfer destination
    /// when the caller addresses a user rather than an account).
    pub primary: bool,
    /// Masked card reference shown in the app, e.g. "**** 4582".
    pub card_number: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a fresh zero-balance account.
    pub fn new(owner_id: UserId, title: impl Into<String>, currency: Currency, primary: bool) -> Self {
        let id = AccountId::new();
        Self {
            id,
            owner_id,
            title: title.into(),
            balance: 0,
            currency,
            status: AccountStatus::Active,
            primary,
            card_number: masked_card_number(&id),
            created_at: Utc::now(),
        }
    }

    pub fn balance_money(&self) -> Money {
        Money::from_minor(self.balance, self.currency)
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::validation("account is frozen"))
        }
    }

    pub fn ensure_owned_by(&self, user_id: UserId) -> Result<(), DomainError> {
        if self.owner_id == user_id {
            Ok(())
        } else {
            Err(DomainError::Unauthorized)
        }
    }
}

/// Derive the app-facing masked card number from the account id.
///
/// Purely cosmetic; the last four hex digits of the id are stable and
/// unique enough to tell cards apart in a list.
fn masked_card_number(id: &AccountId) -> String {
    let hex = id.as_uuid().simple().to_string();
    format!("**** {}", &hex[hex.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_starts_empty_and_active() {
        let owner = UserId::new();
        let acc = Account::new(owner, "Fuel", Currency::Usd, true);
        assert_eq!(acc.balance, 0);
        assert!(acc.is_active());
        assert!(acc.primary);
        assert!(acc.card_number.starts_with("**** "));
        assert_eq!(acc.card_number.len(), 9);
    }

    #[test]
    fn frozen_account_fails_the_active_guard() {
        let mut acc = Account::new(UserId::new(), "Fuel", Currency::Usd, false);
        acc.status = AccountStatus::Frozen;
        assert!(acc.ensure_active().is_err());
    }

    #[test]
    fn ownership_guard() {
        let owner = UserId::new();
        let acc = Account::new(owner, "Fuel", Currency::Usd, false);
        assert!(acc.ensure_owned_by(owner).is_ok());
        assert_eq!(
            acc.ensure_owned_by(UserId::new()).unwrap_err(),
            DomainError::Unauthorized
        );
    }
}
