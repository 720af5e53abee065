//! Request/response DTOs and JSON mapping helpers.
//!
//! Amounts travel as decimal strings ("40.00"); balances in responses are
//! rendered from minor units through [`Money`], never floated.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use walletcore_auth::User;
use walletcore_core::{AccountId, Currency, Money};
use walletcore_infra::{Contact, TransferReceipt};
use walletcore_ledger::{
    Account, AccountStatus, Counterparty, LegDirection, PaymentRequest, TransferRecord,
    TransferStatus,
};

use super::errors::json_error;

// -- auth ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub display_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn user_to_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "wallet_id": user.wallet_id,
        "email": user.email,
        "username": user.username,
        "display_name": user.display_name,
        "phone": user.phone,
        "verified": user.verified,
        "created_at": user.created_at,
    })
}

// -- accounts -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub title: String,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
}

pub fn account_to_json(account: &Account) -> Value {
    json!({
        "id": account.id,
        "owner_id": account.owner_id,
        "title": account.title,
        "balance": account.balance_money().to_string(),
        "currency": account.currency,
        "status": match account.status {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
        },
        "primary": account.primary,
        "card_number": account.card_number,
        "created_at": account.created_at,
    })
}

// -- transfers ----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: AccountId,
    pub destination: DestinationDto,
    pub amount: String,
    pub currency: String,
    pub idempotency_key: String,
}

/// Caller-side addressing; `user` destinations are looked up by username.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationDto {
    Account { id: AccountId },
    User { username: String },
    External { recipient: String },
}

pub fn receipt_to_json(receipt: &TransferReceipt) -> Value {
    let to_decimal =
        |minor: Option<i64>| minor.map(|m| Money::from_minor(m, receipt.currency).to_string());
    json!({
        "transfer_id": receipt.transfer_id,
        "source_account_id": receipt.source_account_id,
        "destination_account_id": receipt.destination_account_id,
        "source_balance": to_decimal(receipt.source_balance),
        "destination_balance": to_decimal(receipt.destination_balance),
        "amount": Money::from_minor(receipt.amount, receipt.currency).to_string(),
        "currency": receipt.currency,
        "replayed": receipt.replayed,
    })
}

pub fn record_to_json(record: &TransferRecord) -> Value {
    let counterparty = record.counterparty.as_ref().map(|c| match c {
        Counterparty::Account(id) => json!({ "kind": "account", "id": id }),
        Counterparty::External(recipient) => {
            json!({ "kind": "external", "recipient": recipient })
        }
    });
    json!({
        "id": record.id,
        "account_id": record.account_id,
        "counterparty": counterparty,
        "amount": Money::from_minor(record.amount, record.currency).to_string(),
        "currency": record.currency,
        "direction": match record.direction {
            LegDirection::Debit => "debit",
            LegDirection::Credit => "credit",
        },
        "transfer_id": record.correlation_id,
        "status": match record.status {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        },
        "created_at": record.created_at,
    })
}

// -- contacts -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub username: String,
}

pub fn contact_to_json(contact: &Contact) -> Value {
    json!({
        "id": contact.id,
        "name": contact.name,
        "username": contact.username,
    })
}

// -- payment requests ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub recipient: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub source_account_id: AccountId,
    pub idempotency_key: String,
}

pub fn payment_request_to_json(request: &PaymentRequest) -> Value {
    json!({
        "id": request.id,
        "requester_id": request.requester_id,
        "amount": request.amount.to_string(),
        "currency": request.amount.currency(),
        "recipient": request.recipient,
        "status": request.status,
        "created_at": request.created_at,
        "expires_at": request.expires_at,
    })
}

// -- parsing helpers ----------------------------------------------------

pub fn parse_currency(raw: &str) -> Result<Currency, axum::response::Response> {
    raw.parse().map_err(|e| {
        json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            format!("{e}"),
        )
    })
}

/// Parse a decimal-string amount against a currency, rejecting excess
/// precision (e.g. "1.005" in USD).
pub fn parse_amount(raw: &str, currency: Currency) -> Result<Money, axum::response::Response> {
    Money::parse(raw, currency).map_err(|e| {
        json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            format!("{e}"),
        )
    })
}
