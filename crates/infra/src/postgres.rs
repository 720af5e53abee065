//! Postgres-backed store implementations.
//!
//! ## Atomic transfer execution
//!
//! `PostgresLedgerStore::execute` runs one database transaction:
//!
//! 1. Replay check against `transfer_receipts`.
//! 2. `SELECT ... FOR UPDATE` of the involved accounts in id order, so two
//!    opposed transfers never lock A,B and B,A.
//! 3. Conditional balance updates (`balance >= amount` guarded in SQL).
//! 4. Insert of the log legs and the receipt.
//!
//! The receipt's primary key doubles as the uniqueness guarantee: a
//! concurrent duplicate fails with `23505`, at which point we roll back and
//! answer from the committed receipt.
//!
//! ## Error mapping
//!
//! Unique violations (`23505`) mean either a replay (receipts) or a
//! duplicate identity field (users, contacts); everything else surfaces as
//! a `Storage` error, retryable by the caller with the same idempotency
//! key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;

use walletcore_auth::{PasswordHash, Session, SessionToken, User, WalletHandle};
use walletcore_core::{
    AccountId, ContactId, Currency, Money, PaymentRequestId, TransferId, UserId,
};
use walletcore_ledger::{
    Account, AccountStatus, Counterparty, IdempotencyKey, PaymentRequest,
    PaymentRequestStatus, PreparedTransfer, TransferFlow, TransferRecord,
};

use crate::stores::{
    Contact, LedgerStore, LedgerStoreError, LogPage, PaymentRequestStore,
    PaymentRequestStoreError, RecordPage, SessionStore, TransferReceipt, UserStore,
    UserStoreError,
};

const SCHEMA: &str = include_str!("schema.sql");

/// Connect and apply the schema.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

fn storage(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    LedgerStoreError::Storage(format!("{operation}: {err}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    err.as_database_error().and_then(|db| db.constraint())
}

// -- enum <-> text ------------------------------------------------------

fn account_status_str(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "active",
        AccountStatus::Frozen => "frozen",
    }
}

fn parse_account_status(s: &str) -> Result<AccountStatus, LedgerStoreError> {
    match s {
        "active" => Ok(AccountStatus::Active),
        "frozen" => Ok(AccountStatus::Frozen),
        other => Err(LedgerStoreError::Storage(format!(
            "unknown account status '{other}'"
        ))),
    }
}

fn parse_currency(s: &str) -> Result<Currency, LedgerStoreError> {
    s.parse()
        .map_err(|e| LedgerStoreError::Storage(format!("stored currency: {e}")))
}

fn account_from_row(row: &PgRow) -> Result<Account, LedgerStoreError> {
    let currency: String = row.try_get("currency").map_err(|e| storage("row", e))?;
    let status: String = row.try_get("status").map_err(|e| storage("row", e))?;
    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id").map_err(|e| storage("row", e))?),
        owner_id: UserId::from_uuid(row.try_get("owner_id").map_err(|e| storage("row", e))?),
        title: row.try_get("title").map_err(|e| storage("row", e))?,
        balance: row.try_get("balance").map_err(|e| storage("row", e))?,
        currency: parse_currency(&currency)?,
        status: parse_account_status(&status)?,
        primary: row.try_get("is_primary").map_err(|e| storage("row", e))?,
        card_number: row.try_get("card_number").map_err(|e| storage("row", e))?,
        created_at: row.try_get("created_at").map_err(|e| storage("row", e))?,
    })
}

fn record_from_row(row: &PgRow) -> Result<TransferRecord, LedgerStoreError> {
    let currency: String = row.try_get("currency").map_err(|e| storage("row", e))?;
    let counterparty: Option<serde_json::Value> =
        row.try_get("counterparty").map_err(|e| storage("row", e))?;
    let counterparty: Option<Counterparty> = counterparty
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| LedgerStoreError::Storage(format!("stored counterparty: {e}")))?;
    let direction = match row
        .try_get::<String, _>("direction")
        .map_err(|e| storage("row", e))?
        .as_str()
    {
        "debit" => walletcore_ledger::LegDirection::Debit,
        "credit" => walletcore_ledger::LegDirection::Credit,
        other => {
            return Err(LedgerStoreError::Storage(format!(
                "unknown leg direction '{other}'"
            )))
        }
    };
    let status = match row
        .try_get::<String, _>("status")
        .map_err(|e| storage("row", e))?
        .as_str()
    {
        "pending" => walletcore_ledger::TransferStatus::Pending,
        "completed" => walletcore_ledger::TransferStatus::Completed,
        "failed" => walletcore_ledger::TransferStatus::Failed,
        other => {
            return Err(LedgerStoreError::Storage(format!(
                "unknown transfer status '{other}'"
            )))
        }
    };
    let key: String = row
        .try_get("idempotency_key")
        .map_err(|e| storage("row", e))?;
    Ok(TransferRecord {
        id: TransferId::from_uuid(row.try_get("id").map_err(|e| storage("row", e))?),
        account_id: AccountId::from_uuid(row.try_get("account_id").map_err(|e| storage("row", e))?),
        counterparty,
        amount: row.try_get("amount").map_err(|e| storage("row", e))?,
        currency: parse_currency(&currency)?,
        direction,
        correlation_id: TransferId::from_uuid(
            row.try_get("correlation_id").map_err(|e| storage("row", e))?,
        ),
        idempotency_key: IdempotencyKey::new(key)
            .map_err(|e| LedgerStoreError::Storage(format!("stored idempotency key: {e}")))?,
        status,
        created_at: row.try_get("created_at").map_err(|e| storage("row", e))?,
    })
}

fn receipt_from_row(row: &PgRow) -> Result<TransferReceipt, LedgerStoreError> {
    let currency: String = row.try_get("currency").map_err(|e| storage("row", e))?;
    let source: Option<uuid::Uuid> = row
        .try_get("source_account_id")
        .map_err(|e| storage("row", e))?;
    let destination: Option<uuid::Uuid> = row
        .try_get("destination_account_id")
        .map_err(|e| storage("row", e))?;
    Ok(TransferReceipt {
        transfer_id: TransferId::from_uuid(row.try_get("transfer_id").map_err(|e| storage("row", e))?),
        source_account_id: source.map(AccountId::from_uuid),
        destination_account_id: destination.map(AccountId::from_uuid),
        source_balance: row.try_get("source_balance").map_err(|e| storage("row", e))?,
        destination_balance: row
            .try_get("destination_balance")
            .map_err(|e| storage("row", e))?,
        amount: row.try_get("amount").map_err(|e| storage("row", e))?,
        currency: parse_currency(&currency)?,
        replayed: false,
    })
}

const ACCOUNT_COLUMNS: &str =
    "id, owner_id, title, balance, currency, status, is_primary, card_number, created_at";

/// Postgres ledger store.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn receipt_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        key: &IdempotencyKey,
    ) -> Result<Option<TransferReceipt>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT transfer_id, source_account_id, destination_account_id,
                   source_balance, destination_balance, amount, currency
            FROM transfer_receipts
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage("select_receipt", e))?;
        row.as_ref().map(receipt_from_row).transpose()
    }

    /// Lock the given accounts in id order and return them keyed by id.
    async fn lock_accounts(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[AccountId],
    ) -> Result<Vec<Account>, LedgerStoreError> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(&uuids)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| storage("lock_accounts", e))?;
        if rows.len() != ids.len() {
            return Err(LedgerStoreError::AccountNotFound);
        }
        rows.iter().map(account_from_row).collect()
    }

    /// Debit under the row lock; the SQL condition backs up the in-process
    /// check against anything that slipped between snapshot and lock.
    async fn debit(
        tx: &mut Transaction<'_, Postgres>,
        id: AccountId,
        amount: i64,
    ) -> Result<i64, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance - $2
            WHERE id = $1 AND status = 'active' AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage("debit", e))?;
        match row {
            Some(row) => row.try_get("balance").map_err(|e| storage("debit", e)),
            None => Err(LedgerStoreError::InsufficientFunds),
        }
    }

    async fn credit(
        tx: &mut Transaction<'_, Postgres>,
        id: AccountId,
        amount: i64,
    ) -> Result<i64, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1 AND status = 'active'
            RETURNING balance
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| storage("credit", e))?;
        match row {
            Some(row) => row.try_get("balance").map_err(|e| storage("credit", e)),
            None => Err(LedgerStoreError::AccountFrozen),
        }
    }

    async fn insert_leg(
        tx: &mut Transaction<'_, Postgres>,
        leg: &TransferRecord,
    ) -> Result<(), LedgerStoreError> {
        let counterparty = leg
            .counterparty
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| LedgerStoreError::Storage(format!("counterparty encode: {e}")))?;
        let direction = match leg.direction {
            walletcore_ledger::LegDirection::Debit => "debit",
            walletcore_ledger::LegDirection::Credit => "credit",
        };
        let status = match leg.status {
            walletcore_ledger::TransferStatus::Pending => "pending",
            walletcore_ledger::TransferStatus::Completed => "completed",
            walletcore_ledger::TransferStatus::Failed => "failed",
        };
        sqlx::query(
            r#"
            INSERT INTO transfer_records
                (id, account_id, counterparty, amount, currency, direction,
                 correlation_id, idempotency_key, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(leg.id.as_uuid())
        .bind(leg.account_id.as_uuid())
        .bind(counterparty)
        .bind(leg.amount)
        .bind(leg.currency.as_str())
        .bind(direction)
        .bind(leg.correlation_id.as_uuid())
        .bind(leg.idempotency_key.as_str())
        .bind(status)
        .bind(leg.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| storage("insert_leg", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn create_account(&self, account: Account) -> Result<Account, LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, owner_id, title, balance, currency, status, is_primary,
                 card_number, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.owner_id.as_uuid())
        .bind(&account.title)
        .bind(account.balance)
        .bind(account.currency.as_str())
        .bind(account_status_str(account.status))
        .bind(account.primary)
        .bind(&account.card_number)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("create_account", e))?;
        Ok(account)
    }

    async fn account(&self, id: AccountId) -> Result<Account, LedgerStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("account", e))?;
        match row {
            Some(row) => account_from_row(&row),
            None => Err(LedgerStoreError::AccountNotFound),
        }
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("accounts_for_owner", e))?;
        rows.iter().map(account_from_row).collect()
    }

    async fn primary_account_of(&self, owner: UserId) -> Result<Account, LedgerStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1 AND is_primary"
        ))
        .bind(owner.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("primary_account_of", e))?;
        match row {
            Some(row) => account_from_row(&row),
            None => Err(LedgerStoreError::AccountNotFound),
        }
    }

    #[instrument(skip(self), fields(%id))]
    async fn freeze_account(&self, id: AccountId) -> Result<Account, LedgerStoreError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET status = 'frozen' WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("freeze_account", e))?;
        match row {
            Some(row) => account_from_row(&row),
            None => Err(LedgerStoreError::AccountNotFound),
        }
    }

    #[instrument(skip(self), fields(%id, delta_minor))]
    async fn adjust_balance(
        &self,
        id: AccountId,
        delta_minor: i64,
        min_balance: i64,
    ) -> Result<Account, LedgerStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1 AND status = 'active' AND balance + $2 >= $3
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(delta_minor)
        .bind(min_balance)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("adjust_balance", e))?;
        if let Some(row) = row {
            return account_from_row(&row);
        }
        // Zero rows: diagnose which condition failed.
        match self.account(id).await {
            Ok(account) if !account.is_active() => Err(LedgerStoreError::AccountFrozen),
            Ok(_) => Err(LedgerStoreError::InsufficientFunds),
            Err(e) => Err(e),
        }
    }

    #[instrument(
        skip(self, prepared),
        fields(transfer_id = %prepared.correlation_id, amount = prepared.amount.minor())
    )]
    async fn execute(
        &self,
        prepared: &PreparedTransfer,
    ) -> Result<TransferReceipt, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage("begin", e))?;

        if let Some(mut receipt) = Self::receipt_in_tx(&mut tx, &prepared.idempotency_key).await? {
            receipt.replayed = true;
            return Ok(receipt);
        }

        let amount = prepared.amount.minor();
        let (source_result, destination_result) = match &prepared.flow {
            TransferFlow::Internal { source, destination } => {
                let mut ids = [*source, *destination];
                ids.sort();
                let locked = Self::lock_accounts(&mut tx, &ids).await?;
                for account in &locked {
                    if !account.is_active() {
                        return Err(LedgerStoreError::AccountFrozen);
                    }
                }
                let src_balance = Self::debit(&mut tx, *source, amount).await?;
                let dst_balance = Self::credit(&mut tx, *destination, amount).await?;
                (
                    Some((*source, src_balance)),
                    Some((*destination, dst_balance)),
                )
            }
            TransferFlow::Outbound { source, .. } => {
                Self::lock_accounts(&mut tx, &[*source]).await?;
                let src_balance = Self::debit(&mut tx, *source, amount).await?;
                (Some((*source, src_balance)), None)
            }
            TransferFlow::Deposit { destination } => {
                Self::lock_accounts(&mut tx, &[*destination]).await?;
                let dst_balance = Self::credit(&mut tx, *destination, amount).await?;
                (None, Some((*destination, dst_balance)))
            }
        };

        for leg in prepared.legs(Utc::now()) {
            Self::insert_leg(&mut tx, &leg).await?;
        }

        let insert = sqlx::query(
            r#"
            INSERT INTO transfer_receipts
                (idempotency_key, transfer_id, source_account_id,
                 destination_account_id, source_balance, destination_balance,
                 amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(prepared.idempotency_key.as_str())
        .bind(prepared.correlation_id.as_uuid())
        .bind(source_result.map(|(id, _)| *id.as_uuid()))
        .bind(destination_result.map(|(id, _)| *id.as_uuid()))
        .bind(source_result.map(|(_, b)| b))
        .bind(destination_result.map(|(_, b)| b))
        .bind(amount)
        .bind(prepared.amount.currency().as_str())
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                // Lost the race to a concurrent replay: drop our work and
                // answer from the winner's committed receipt.
                tx.rollback().await.map_err(|e| storage("rollback", e))?;
                let mut won = self
                    .receipt_for(&prepared.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        LedgerStoreError::Storage("receipt vanished after conflict".to_string())
                    })?;
                won.replayed = true;
                return Ok(won);
            }
            Err(e) => return Err(storage("insert_receipt", e)),
        }

        tx.commit().await.map_err(|e| storage("commit", e))?;

        Ok(TransferReceipt {
            transfer_id: prepared.correlation_id,
            source_account_id: source_result.map(|(id, _)| id),
            destination_account_id: destination_result.map(|(id, _)| id),
            source_balance: source_result.map(|(_, b)| b),
            destination_balance: destination_result.map(|(_, b)| b),
            amount,
            currency: prepared.amount.currency(),
            replayed: false,
        })
    }

    async fn receipt_for(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransferReceipt>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT transfer_id, source_account_id, destination_account_id,
                   source_balance, destination_balance, amount, currency
            FROM transfer_receipts
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("receipt_for", e))?;
        row.as_ref()
            .map(receipt_from_row)
            .transpose()
            .map(|r| {
                r.map(|mut receipt| {
                    receipt.replayed = true;
                    receipt
                })
            })
    }

    async fn list_records(
        &self,
        account: AccountId,
        page: LogPage,
    ) -> Result<RecordPage, LedgerStoreError> {
        // Fetch one extra row to learn whether a next page exists.
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, counterparty, amount, currency, direction,
                   correlation_id, idempotency_key, status, created_at
            FROM transfer_records
            WHERE account_id = $1 AND ($2::uuid IS NULL OR id < $2)
            ORDER BY id DESC
            LIMIT $3
            "#,
        )
        .bind(account.as_uuid())
        .bind(page.cursor.map(|c| *c.as_uuid()))
        .bind(page.limit as i64 + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage("list_records", e))?;

        let mut items: Vec<TransferRecord> = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<_, _>>()?;
        let next_cursor = if items.len() > page.limit as usize {
            items.truncate(page.limit as usize);
            items.last().map(|r| r.id)
        } else {
            None
        };
        Ok(RecordPage { items, next_cursor })
    }
}

/// Postgres user + contact store.
#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_storage(operation: &str, err: sqlx::Error) -> UserStoreError {
    UserStoreError::Storage(format!("{operation}: {err}"))
}

fn user_from_row(row: &PgRow) -> Result<User, UserStoreError> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(|e| user_storage("row", e))?),
        wallet_id: WalletHandle::from_raw(
            row.try_get::<String, _>("wallet_id")
                .map_err(|e| user_storage("row", e))?,
        ),
        email: row.try_get("email").map_err(|e| user_storage("row", e))?,
        username: row.try_get("username").map_err(|e| user_storage("row", e))?,
        display_name: row
            .try_get("display_name")
            .map_err(|e| user_storage("row", e))?,
        phone: row.try_get("phone").map_err(|e| user_storage("row", e))?,
        password_hash: PasswordHash::from_encoded(
            row.try_get::<String, _>("password_hash")
                .map_err(|e| user_storage("row", e))?,
        ),
        verified: row.try_get("verified").map_err(|e| user_storage("row", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| user_storage("row", e))?,
    })
}

const USER_COLUMNS: &str =
    "id, wallet_id, email, username, display_name, phone, password_hash, verified, created_at";

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create_user(&self, user: User) -> Result<User, UserStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users
                (id, wallet_id, email, username, display_name, phone,
                 password_hash, verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.wallet_id.as_str())
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.phone)
        .bind(user.password_hash.as_str())
        .bind(user.verified)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(e) if is_unique_violation(&e) => match violated_constraint(&e) {
                Some("users_email_key") => Err(UserStoreError::DuplicateEmail),
                Some("users_username_key") => Err(UserStoreError::DuplicateUsername),
                _ => Err(user_storage("create_user", e)),
            },
            Err(e) => Err(user_storage("create_user", e)),
        }
    }

    async fn user_by_id(&self, id: UserId) -> Result<User, UserStoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| user_storage("user_by_id", e))?;
        match row {
            Some(row) => user_from_row(&row),
            None => Err(UserStoreError::NotFound),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| user_storage("user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| user_storage("user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn contacts_for(&self, user: UserId) -> Result<Vec<Contact>, UserStoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, username FROM contacts WHERE user_id = $1 ORDER BY name",
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| user_storage("contacts_for", e))?;
        rows.iter()
            .map(|row| {
                Ok(Contact {
                    id: ContactId::from_uuid(row.try_get("id").map_err(|e| user_storage("row", e))?),
                    user_id: UserId::from_uuid(
                        row.try_get("user_id").map_err(|e| user_storage("row", e))?,
                    ),
                    name: row.try_get("name").map_err(|e| user_storage("row", e))?,
                    username: row.try_get("username").map_err(|e| user_storage("row", e))?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, contact), fields(user_id = %contact.user_id))]
    async fn add_contact(&self, contact: Contact) -> Result<Contact, UserStoreError> {
        let result = sqlx::query(
            "INSERT INTO contacts (id, user_id, name, username) VALUES ($1, $2, $3, $4)",
        )
        .bind(contact.id.as_uuid())
        .bind(contact.user_id.as_uuid())
        .bind(&contact.name)
        .bind(&contact.username)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(contact),
            Err(e) if is_unique_violation(&e) => Err(UserStoreError::DuplicateContact),
            Err(e) => Err(user_storage("add_contact", e)),
        }
    }
}

/// Postgres session store.
#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn insert(&self, session: Session) -> Result<(), LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.token.as_str())
        .bind(session.user_id.as_uuid())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| storage("insert_session", e))?;
        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Option<Session>, LedgerStoreError> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage("get_session", e))?;
        row.map(|row| {
            Ok(Session {
                token: SessionToken::from_raw(
                    row.try_get::<String, _>("token").map_err(|e| storage("row", e))?,
                ),
                user_id: UserId::from_uuid(
                    row.try_get("user_id").map_err(|e| storage("row", e))?,
                ),
                created_at: row.try_get("created_at").map_err(|e| storage("row", e))?,
                expires_at: row.try_get("expires_at").map_err(|e| storage("row", e))?,
            })
        })
        .transpose()
    }

    async fn revoke(&self, token: &SessionToken) -> Result<(), LedgerStoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| storage("revoke_session", e))?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerStoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| storage("purge_expired", e))?;
        Ok(result.rows_affected())
    }
}

/// Postgres payment request store.
#[derive(Debug, Clone)]
pub struct PostgresPaymentRequestStore {
    pool: PgPool,
}

impl PostgresPaymentRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn request_storage(operation: &str, err: sqlx::Error) -> PaymentRequestStoreError {
    PaymentRequestStoreError::Storage(format!("{operation}: {err}"))
}

fn request_status_str(status: PaymentRequestStatus) -> &'static str {
    match status {
        PaymentRequestStatus::Pending => "pending",
        PaymentRequestStatus::Paid => "paid",
        PaymentRequestStatus::Expired => "expired",
    }
}

fn request_from_row(row: &PgRow) -> Result<PaymentRequest, PaymentRequestStoreError> {
    let currency: String = row
        .try_get("currency")
        .map_err(|e| request_storage("row", e))?;
    let currency: Currency = currency
        .parse()
        .map_err(|e| PaymentRequestStoreError::Storage(format!("stored currency: {e}")))?;
    let status: String = row.try_get("status").map_err(|e| request_storage("row", e))?;
    let status = match status.as_str() {
        "pending" => PaymentRequestStatus::Pending,
        "paid" => PaymentRequestStatus::Paid,
        "expired" => PaymentRequestStatus::Expired,
        other => {
            return Err(PaymentRequestStoreError::Storage(format!(
                "unknown request status '{other}'"
            )))
        }
    };
    Ok(PaymentRequest {
        id: PaymentRequestId::from_uuid(row.try_get("id").map_err(|e| request_storage("row", e))?),
        requester_id: UserId::from_uuid(
            row.try_get("requester_id")
                .map_err(|e| request_storage("row", e))?,
        ),
        amount: Money::from_minor(
            row.try_get("amount").map_err(|e| request_storage("row", e))?,
            currency,
        ),
        recipient: row
            .try_get("recipient")
            .map_err(|e| request_storage("row", e))?,
        status,
        created_at: row
            .try_get("created_at")
            .map_err(|e| request_storage("row", e))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| request_storage("row", e))?,
    })
}

const REQUEST_COLUMNS: &str =
    "id, requester_id, amount, currency, recipient, status, created_at, expires_at";

#[async_trait]
impl PaymentRequestStore for PostgresPaymentRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn create(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentRequest, PaymentRequestStoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_requests
                (id, requester_id, amount, currency, recipient, status,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.requester_id.as_uuid())
        .bind(request.amount.minor())
        .bind(request.amount.currency().as_str())
        .bind(&request.recipient)
        .bind(request_status_str(request.status))
        .bind(request.created_at)
        .bind(request.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| request_storage("create", e))?;
        Ok(request)
    }

    async fn get(&self, id: PaymentRequestId) -> Result<PaymentRequest, PaymentRequestStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM payment_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| request_storage("get", e))?;
        match row {
            Some(row) => request_from_row(&row),
            None => Err(PaymentRequestStoreError::NotFound),
        }
    }

    async fn list_for_user(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentRequest>, PaymentRequestStoreError> {
        // Lazy expiry before the read, so callers never see an overdue
        // request still marked pending.
        sqlx::query(
            r#"
            UPDATE payment_requests SET status = 'expired'
            WHERE requester_id = $1 AND status = 'pending' AND expires_at <= $2
            "#,
        )
        .bind(user.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| request_storage("list_for_user", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM payment_requests WHERE requester_id = $1 ORDER BY id DESC"
        ))
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| request_storage("list_for_user", e))?;
        rows.iter().map(request_from_row).collect()
    }

    #[instrument(skip(self), fields(%id))]
    async fn mark_paid(
        &self,
        id: PaymentRequestId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, PaymentRequestStoreError> {
        // Single conditional transition; losing a concurrent race shows up
        // as zero rows, diagnosed below.
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_requests SET status = 'paid'
            WHERE id = $1 AND status = 'pending' AND expires_at > $2
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| request_storage("mark_paid", e))?;
        if let Some(row) = row {
            return request_from_row(&row);
        }
        let request = self.get(id).await?;
        match request.status {
            PaymentRequestStatus::Paid => Err(PaymentRequestStoreError::AlreadyPaid),
            _ if request.is_overdue(now) || request.status == PaymentRequestStatus::Expired => {
                Err(PaymentRequestStoreError::Expired)
            }
            _ => Err(PaymentRequestStoreError::Storage(
                "mark_paid matched no rows for a pending request".to_string(),
            )),
        }
    }

    async fn reset_to_pending(
        &self,
        id: PaymentRequestId,
    ) -> Result<(), PaymentRequestStoreError> {
        sqlx::query("UPDATE payment_requests SET status = 'pending' WHERE id = $1 AND status = 'paid'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| request_storage("reset_to_pending", e))?;
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, PaymentRequestStoreError> {
        let result = sqlx::query(
            "UPDATE payment_requests SET status = 'expired' WHERE status = 'pending' AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| request_storage("expire_overdue", e))?;
        Ok(result.rows_affected())
    }
}
