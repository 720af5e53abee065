//! Payment requests and their confirmation.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use walletcore_core::PaymentRequestId;
use walletcore_infra::PaymentRequestStoreError;
use walletcore_ledger::{Destination, IdempotencyKey, PaymentRequest};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id/pay", post(pay))
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<dto::CreatePaymentRequest>,
) -> axum::response::Response {
    let currency = match dto::parse_currency(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let amount = match dto::parse_amount(&body.amount, currency) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let request = match PaymentRequest::new(ctx.user_id(), amount, body.recipient, None) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.requests.create(request).await {
        Ok(request) => (
            StatusCode::CREATED,
            Json(dto::payment_request_to_json(&request)),
        )
            .into_response(),
        Err(e) => errors::request_error_to_response(e),
    }
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> axum::response::Response {
    match services.requests.list_for_user(ctx.user_id(), Utc::now()).await {
        Ok(requests) => {
            let items: Vec<_> = requests.iter().map(dto::payment_request_to_json).collect();
            Json(json!({ "items": items })).into_response()
        }
        Err(e) => errors::request_error_to_response(e),
    }
}

/// Confirm a request: mark it paid, then execute the transfer to the
/// requester's primary account.
///
/// The conditional `mark_paid` is the gate against double payment; if the
/// transfer then fails, the request is reset to pending. A retry that hits
/// `AlreadyPaid` with a key whose receipt exists is answered as a replay.
pub async fn pay(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<PaymentRequestId>,
    Json(body): Json<dto::PayRequest>,
) -> axum::response::Response {
    let key = match IdempotencyKey::new(body.idempotency_key) {
        Ok(k) => k,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let request = match services.requests.get(id).await {
        Ok(r) => r,
        Err(e) => return errors::request_error_to_response(e),
    };
    if request.requester_id == ctx.user_id() {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            "cannot pay your own request",
        );
    }

    let request = match services.requests.mark_paid(id, Utc::now()).await {
        Ok(r) => r,
        Err(PaymentRequestStoreError::AlreadyPaid) => {
            // A paid request plus a committed receipt for this key means
            // this is a retry of the call that paid it.
            match services.transfers.receipt_for(&key).await {
                Ok(Some(receipt)) => {
                    return (
                        StatusCode::OK,
                        Json(json!({
                            "request": dto::payment_request_to_json(&request),
                            "receipt": dto::receipt_to_json(&receipt),
                        })),
                    )
                        .into_response()
                }
                Ok(None) => {
                    return errors::request_error_to_response(
                        PaymentRequestStoreError::AlreadyPaid,
                    )
                }
                Err(e) => return errors::transfer_error_to_response(e),
            }
        }
        Err(e) => return errors::request_error_to_response(e),
    };

    let receipt = match services
        .transfers
        .transfer(
            ctx.user_id(),
            body.source_account_id,
            Destination::User(request.requester_id),
            request.amount,
            key,
        )
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            // Compensate: the request was not actually paid.
            if let Err(reset) = services.requests.reset_to_pending(id).await {
                warn!(%id, error = %reset, "failed to reset payment request after transfer error");
            }
            return errors::transfer_error_to_response(e);
        }
    };

    (
        StatusCode::CREATED,
        Json(json!({
            "request": dto::payment_request_to_json(&request),
            "receipt": dto::receipt_to_json(&receipt),
        })),
    )
        .into_response()
}
