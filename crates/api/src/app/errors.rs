use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use walletcore_core::DomainError;
use walletcore_infra::{
    LedgerStoreError, PaymentRequestStoreError, TransferError, UserStoreError,
};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation", msg)
        }
        DomainError::InvalidId(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "forbidden", "not your resource")
        }
    }
}

pub fn ledger_error_to_response(err: LedgerStoreError) -> axum::response::Response {
    match err {
        LedgerStoreError::AccountNotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "account not found")
        }
        LedgerStoreError::AccountFrozen => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "account_frozen",
            "account is frozen",
        ),
        LedgerStoreError::InsufficientFunds => json_error(
            StatusCode::CONFLICT,
            "insufficient_funds",
            "insufficient funds; retry with the same idempotency key after topping up",
        ),
        LedgerStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage", msg)
        }
    }
}

pub fn transfer_error_to_response(err: TransferError) -> axum::response::Response {
    match err {
        TransferError::Domain(e) => domain_error_to_response(e),
        TransferError::Store(e) => ledger_error_to_response(e),
    }
}

pub fn user_error_to_response(err: UserStoreError) -> axum::response::Response {
    match err {
        UserStoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        UserStoreError::DuplicateEmail => {
            json_error(StatusCode::CONFLICT, "conflict", "email already registered")
        }
        UserStoreError::DuplicateUsername => {
            json_error(StatusCode::CONFLICT, "conflict", "username already taken")
        }
        UserStoreError::DuplicateContact => {
            json_error(StatusCode::CONFLICT, "conflict", "contact already saved")
        }
        UserStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage", msg)
        }
    }
}

pub fn request_error_to_response(err: PaymentRequestStoreError) -> axum::response::Response {
    match err {
        PaymentRequestStoreError::NotFound => {
            json_error(StatusCode::NOT_FOUND, "not_found", "payment request not found")
        }
        PaymentRequestStoreError::AlreadyPaid => {
            json_error(StatusCode::CONFLICT, "conflict", "request already paid")
        }
        PaymentRequestStoreError::Expired => {
            json_error(StatusCode::GONE, "gone", "payment request expired")
        }
        PaymentRequestStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage", msg)
        }
    }
}
