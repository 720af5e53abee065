//! In-memory store implementations.
//!
//! Intended for tests/dev. One mutex over the whole ledger state is the
//! atomic unit: every check in `execute` happens before any mutation under
//! the same lock, so a failed transfer leaves nothing behind and debits of
//! one account serialize.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use walletcore_auth::{Session, SessionToken, User};
use walletcore_core::{AccountId, PaymentRequestId, TransferId, UserId};
use walletcore_ledger::{
    Account, AccountStatus, IdempotencyKey, PaymentRequest, PaymentRequestStatus,
    PreparedTransfer, TransferFlow, TransferRecord,
};

use crate::stores::{
    Contact, LedgerStore, LedgerStoreError, LogPage, PaymentRequestStore,
    PaymentRequestStoreError, RecordPage, SessionStore, TransferReceipt, UserStore,
    UserStoreError,
};

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    /// Per-account log in append (= chronological = id) order.
    records: HashMap<AccountId, Vec<TransferRecord>>,
    receipts: HashMap<String, TransferReceipt>,
}

/// In-memory ledger store.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, LedgerStoreError> {
        self.state
            .lock()
            .map_err(|_| LedgerStoreError::Storage("ledger lock poisoned".to_string()))
    }
}

fn active_account<'a>(
    state: &'a LedgerState,
    id: AccountId,
) -> Result<&'a Account, LedgerStoreError> {
    let account = state
        .accounts
        .get(&id)
        .ok_or(LedgerStoreError::AccountNotFound)?;
    if account.status != AccountStatus::Active {
        return Err(LedgerStoreError::AccountFrozen);
    }
    Ok(account)
}

fn checked_apply(balance: i64, delta: i64) -> Result<i64, LedgerStoreError> {
    balance
        .checked_add(delta)
        .ok_or_else(|| LedgerStoreError::Storage("balance overflow".to_string()))
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_account(&self, account: Account) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock()?;
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account(&self, id: AccountId) -> Result<Account, LedgerStoreError> {
        let state = self.lock()?;
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerStoreError::AccountNotFound)
    }

    async fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>, LedgerStoreError> {
        let state = self.lock()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner_id == owner)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn primary_account_of(&self, owner: UserId) -> Result<Account, LedgerStoreError> {
        let state = self.lock()?;
        state
            .accounts
            .values()
            .find(|a| a.owner_id == owner && a.primary)
            .cloned()
            .ok_or(LedgerStoreError::AccountNotFound)
    }

    async fn freeze_account(&self, id: AccountId) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(LedgerStoreError::AccountNotFound)?;
        account.status = AccountStatus::Frozen;
        Ok(account.clone())
    }

    async fn adjust_balance(
        &self,
        id: AccountId,
        delta_minor: i64,
        min_balance: i64,
    ) -> Result<Account, LedgerStoreError> {
        let mut state = self.lock()?;
        // Check while holding the lock; the check and the write are one
        // critical section, the in-memory equivalent of a conditional UPDATE.
        let next = {
            let account = active_account(&state, id)?;
            let next = checked_apply(account.balance, delta_minor)?;
            if next < min_balance {
                return Err(LedgerStoreError::InsufficientFunds);
            }
            next
        };
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(LedgerStoreError::AccountNotFound)?;
        account.balance = next;
        Ok(account.clone())
    }

    async fn execute(
        &self,
        prepared: &PreparedTransfer,
    ) -> Result<TransferReceipt, LedgerStoreError> {
        let mut state = self.lock()?;

        // Replay answers come from the committed receipt, untouched.
        if let Some(receipt) = state.receipts.get(prepared.idempotency_key.as_str()) {
            let mut receipt = receipt.clone();
            receipt.replayed = true;
            return Ok(receipt);
        }

        let amount = prepared.amount.minor();

        // Decide everything before mutating anything: a failure below this
        // block leaves the state exactly as it was.
        let (source_next, destination_next) = match &prepared.flow {
            TransferFlow::Internal { source, destination } => {
                let src = active_account(&state, *source)?;
                let src_next = checked_apply(src.balance, -amount)?;
                if src_next < 0 {
                    return Err(LedgerStoreError::InsufficientFunds);
                }
                let dst = active_account(&state, *destination)?;
                let dst_next = checked_apply(dst.balance, amount)?;
                (Some((*source, src_next)), Some((*destination, dst_next)))
            }
            TransferFlow::Outbound { source, .. } => {
                let src = active_account(&state, *source)?;
                let src_next = checked_apply(src.balance, -amount)?;
                if src_next < 0 {
                    return Err(LedgerStoreError::InsufficientFunds);
                }
                (Some((*source, src_next)), None)
            }
            TransferFlow::Deposit { destination } => {
                let dst = active_account(&state, *destination)?;
                let dst_next = checked_apply(dst.balance, amount)?;
                (None, Some((*destination, dst_next)))
            }
        };

        if let Some((id, next)) = source_next {
            if let Some(acc) = state.accounts.get_mut(&id) {
                acc.balance = next;
            }
        }
        if let Some((id, next)) = destination_next {
            if let Some(acc) = state.accounts.get_mut(&id) {
                acc.balance = next;
            }
        }

        for leg in prepared.legs(Utc::now()) {
            state.records.entry(leg.account_id).or_default().push(leg);
        }

        let receipt = TransferReceipt {
            transfer_id: prepared.correlation_id,
            source_account_id: source_next.map(|(id, _)| id),
            destination_account_id: destination_next.map(|(id, _)| id),
            source_balance: source_next.map(|(_, b)| b),
            destination_balance: destination_next.map(|(_, b)| b),
            amount,
            currency: prepared.amount.currency(),
            replayed: false,
        };
        state
            .receipts
            .insert(prepared.idempotency_key.as_str().to_string(), receipt.clone());

        Ok(receipt)
    }

    async fn receipt_for(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<TransferReceipt>, LedgerStoreError> {
        let state = self.lock()?;
        Ok(state.receipts.get(key.as_str()).cloned().map(|mut r| {
            r.replayed = true;
            r
        }))
    }

    async fn list_records(
        &self,
        account: AccountId,
        page: LogPage,
    ) -> Result<RecordPage, LedgerStoreError> {
        let state = self.lock()?;
        let empty: Vec<TransferRecord> = Vec::new();
        let all = state.records.get(&account).unwrap_or(&empty);

        let mut items: Vec<TransferRecord> = Vec::with_capacity(page.limit as usize);
        let mut remaining = false;
        for record in all.iter().rev() {
            if let Some(cursor) = page.cursor {
                if record.id >= cursor {
                    continue;
                }
            }
            if items.len() as u32 == page.limit {
                remaining = true;
                break;
            }
            items.push(record.clone());
        }

        let next_cursor = if remaining {
            items.last().map(|r: &TransferRecord| r.id)
        } else {
            None
        };
        Ok(RecordPage { items, next_cursor })
    }
}

/// In-memory user + contact store.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    contacts: RwLock<HashMap<UserId, Vec<Contact>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: User) -> Result<User, UserStoreError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        if users.values().any(|u| u.email == user.email) {
            return Err(UserStoreError::DuplicateEmail);
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(UserStoreError::DuplicateUsername);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: UserId) -> Result<User, UserStoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        users.get(&id).cloned().ok_or(UserStoreError::NotFound)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, UserStoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn contacts_for(&self, user: UserId) -> Result<Vec<Contact>, UserStoreError> {
        let contacts = self
            .contacts
            .read()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        Ok(contacts.get(&user).cloned().unwrap_or_default())
    }

    async fn add_contact(&self, contact: Contact) -> Result<Contact, UserStoreError> {
        let mut contacts = self
            .contacts
            .write()
            .map_err(|_| UserStoreError::Storage("lock poisoned".to_string()))?;
        let list = contacts.entry(contact.user_id).or_default();
        if list.iter().any(|c| c.username == contact.username) {
            return Err(UserStoreError::DuplicateContact);
        }
        list.push(contact.clone());
        Ok(contact)
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Session>>, LedgerStoreError> {
        self.sessions
            .write()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<(), LedgerStoreError> {
        self.write()?
            .insert(session.token.as_str().to_string(), session);
        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Option<Session>, LedgerStoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))?;
        Ok(sessions.get(token.as_str()).cloned())
    }

    async fn revoke(&self, token: &SessionToken) -> Result<(), LedgerStoreError> {
        self.write()?.remove(token.as_str());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerStoreError> {
        let mut sessions = self.write()?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

/// In-memory payment request store.
#[derive(Debug, Default)]
pub struct InMemoryPaymentRequestStore {
    requests: RwLock<HashMap<PaymentRequestId, PaymentRequest>>,
}

impl InMemoryPaymentRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(
        &self,
    ) -> Result<
        std::sync::RwLockWriteGuard<'_, HashMap<PaymentRequestId, PaymentRequest>>,
        PaymentRequestStoreError,
    > {
        self.requests
            .write()
            .map_err(|_| PaymentRequestStoreError::Storage("lock poisoned".to_string()))
    }
}

#[async_trait]
impl PaymentRequestStore for InMemoryPaymentRequestStore {
    async fn create(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentRequest, PaymentRequestStoreError> {
        self.write()?.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, id: PaymentRequestId) -> Result<PaymentRequest, PaymentRequestStoreError> {
        let requests = self
            .requests
            .read()
            .map_err(|_| PaymentRequestStoreError::Storage("lock poisoned".to_string()))?;
        requests
            .get(&id)
            .cloned()
            .ok_or(PaymentRequestStoreError::NotFound)
    }

    async fn list_for_user(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentRequest>, PaymentRequestStoreError> {
        let mut requests = self.write()?;
        let mut out: Vec<PaymentRequest> = requests
            .values_mut()
            .filter(|r| r.requester_id == user)
            .map(|r| {
                r.expire_if_overdue(now);
                r.clone()
            })
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }

    async fn mark_paid(
        &self,
        id: PaymentRequestId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, PaymentRequestStoreError> {
        let mut requests = self.write()?;
        let request = requests
            .get_mut(&id)
            .ok_or(PaymentRequestStoreError::NotFound)?;
        request.expire_if_overdue(now);
        match request.status {
            PaymentRequestStatus::Pending => {
                request.status = PaymentRequestStatus::Paid;
                Ok(request.clone())
            }
            PaymentRequestStatus::Paid => Err(PaymentRequestStoreError::AlreadyPaid),
            PaymentRequestStatus::Expired => Err(PaymentRequestStoreError::Expired),
        }
    }

    async fn reset_to_pending(
        &self,
        id: PaymentRequestId,
    ) -> Result<(), PaymentRequestStoreError> {
        let mut requests = self.write()?;
        let request = requests
            .get_mut(&id)
            .ok_or(PaymentRequestStoreError::NotFound)?;
        if request.status == PaymentRequestStatus::Paid {
            request.status = PaymentRequestStatus::Pending;
        }
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, PaymentRequestStoreError> {
        let mut requests = self.write()?;
        let mut expired = 0;
        for request in requests.values_mut() {
            if request.expire_if_overdue(now) {
                expired += 1;
            }
        }
        Ok(expired)
    }
}
