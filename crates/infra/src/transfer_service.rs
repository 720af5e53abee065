//! Transfer orchestration.
//!
//! Resolves a transfer request (who, from where, to where, how much) into a
//! validated [`PreparedTransfer`] and hands it to the ledger store's atomic
//! unit. Ownership checks happen here; balance checks and replay detection
//! happen in the store.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use walletcore_core::{AccountId, DomainError, Money, UserId};
use walletcore_ledger::{Destination, IdempotencyKey, PreparedTransfer};

use crate::stores::{LedgerStore, LedgerStoreError, TransferReceipt};

/// Transfer orchestration error.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] LedgerStoreError),
}

#[derive(Clone)]
pub struct TransferService {
    ledger: Arc<dyn LedgerStore>,
}

impl TransferService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Move `amount` out of `source`, owned by `actor`, to `destination`.
    ///
    /// Validation order: ownership, then destination resolution, then the
    /// prepared transfer's own checks. A request rejected here reaches no
    /// storage write; a request that reaches [`LedgerStore::execute`]
    /// either commits fully or leaves no trace.
    #[instrument(skip(self, idempotency_key), fields(%actor, %source))]
    pub async fn transfer(
        &self,
        actor: UserId,
        source: AccountId,
        destination: Destination,
        amount: Money,
        idempotency_key: IdempotencyKey,
    ) -> Result<TransferReceipt, TransferError> {
        let source = self.ledger.account(source).await?;
        source.ensure_owned_by(actor)?;

        let prepared = match destination {
            Destination::Account(id) => {
                let dest = self.ledger.account(id).await?;
                PreparedTransfer::internal(&source, &dest, amount, idempotency_key)?
            }
            Destination::User(user_id) => {
                if user_id == actor {
                    return Err(
                        DomainError::validation("cannot send money to yourself").into()
                    );
                }
                let dest = self.ledger.primary_account_of(user_id).await?;
                PreparedTransfer::internal(&source, &dest, amount, idempotency_key)?
            }
            Destination::External(recipient) => {
                PreparedTransfer::outbound(&source, recipient, amount, idempotency_key)?
            }
        };

        Ok(self.ledger.execute(&prepared).await?)
    }

    /// Credit `amount` to an account owned by `actor` (top-up).
    #[instrument(skip(self, idempotency_key), fields(%actor, %account))]
    pub async fn deposit(
        &self,
        actor: UserId,
        account: AccountId,
        amount: Money,
        idempotency_key: IdempotencyKey,
    ) -> Result<TransferReceipt, TransferError> {
        let account = self.ledger.account(account).await?;
        account.ensure_owned_by(actor)?;
        let prepared = PreparedTransfer::deposit(&account, amount, idempotency_key)?;
        Ok(self.ledger.execute(&prepared).await?)
    }

    /// The committed receipt for a key, if one exists.
    pub async fn receipt_for(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransferReceipt>, TransferError> {
        Ok(self.ledger.receipt_for(key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryLedgerStore;
    use walletcore_core::Currency;
    use walletcore_ledger::Account;

    fn key(s: &str) -> IdempotencyKey {
        IdempotencyKey::new(s).unwrap()
    }

    fn usd(minor: i64) -> Money {
        Money::from_minor(minor, Currency::Usd)
    }

    async fn setup() -> (TransferService, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (TransferService::new(store.clone()), store)
    }

    async fn account_with(
        store: &InMemoryLedgerStore,
        owner: UserId,
        minor: i64,
        primary: bool,
    ) -> Account {
        let mut account = Account::new(owner, "Main", Currency::Usd, primary);
        account.balance = minor;
        store.create_account(account).await.unwrap()
    }

    #[tokio::test]
    async fn transfer_rejects_foreign_source() {
        let (service, store) = setup().await;
        let owner = UserId::new();
        let stranger = UserId::new();
        let src = account_with(&store, owner, 5_000, true).await;
        let dst = account_with(&store, UserId::new(), 0, true).await;

        let err = service
            .transfer(
                stranger,
                src.id,
                Destination::Account(dst.id),
                usd(1_000),
                key("k"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Domain(DomainError::Unauthorized)
        ));
        assert_eq!(store.account(src.id).await.unwrap().balance, 5_000);
    }

    #[tokio::test]
    async fn user_destination_lands_on_primary_account() {
        let (service, store) = setup().await;
        let sender = UserId::new();
        let recipient = UserId::new();
        let src = account_with(&store, sender, 5_000, true).await;
        let _side = account_with(&store, recipient, 0, false).await;
        let primary = account_with(&store, recipient, 0, true).await;

        let receipt = service
            .transfer(
                sender,
                src.id,
                Destination::User(recipient),
                usd(2_500),
                key("to-user"),
            )
            .await
            .unwrap();
        assert_eq!(receipt.destination_account_id, Some(primary.id));
        assert_eq!(store.account(primary.id).await.unwrap().balance, 2_500);
    }

    #[tokio::test]
    async fn self_addressed_user_transfer_is_rejected() {
        let (service, store) = setup().await;
        let sender = UserId::new();
        let src = account_with(&store, sender, 5_000, true).await;

        let err = service
            .transfer(
                sender,
                src.id,
                Destination::User(sender),
                usd(1_000),
                key("self"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn external_transfer_debits_only_the_source() {
        let (service, store) = setup().await;
        let sender = UserId::new();
        let src = account_with(&store, sender, 5_000, true).await;

        let receipt = service
            .transfer(
                sender,
                src.id,
                Destination::External("savings@otherbank".into()),
                usd(3_000),
                key("out"),
            )
            .await
            .unwrap();
        assert_eq!(receipt.source_balance, Some(2_000));
        assert_eq!(receipt.destination_account_id, None);
    }

    #[tokio::test]
    async fn deposit_requires_ownership() {
        let (service, store) = setup().await;
        let owner = UserId::new();
        let acc = account_with(&store, owner, 0, true).await;

        assert!(service
            .deposit(UserId::new(), acc.id, usd(100), key("d1"))
            .await
            .is_err());
        let receipt = service
            .deposit(owner, acc.id, usd(100), key("d2"))
            .await
            .unwrap();
        assert_eq!(receipt.destination_balance, Some(100));
    }
}
