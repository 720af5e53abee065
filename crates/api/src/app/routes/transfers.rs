//! The transfer endpoint.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use walletcore_ledger::{Destination, IdempotencyKey};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<dto::TransferRequest>,
) -> axum::response::Response {
    let currency = match dto::parse_currency(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let amount = match dto::parse_amount(&body.amount, currency) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let key = match IdempotencyKey::new(body.idempotency_key) {
        Ok(k) => k,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let destination = match body.destination {
        dto::DestinationDto::Account { id } => Destination::Account(id),
        dto::DestinationDto::User { username } => {
            match services.users.user_by_username(&username).await {
                Ok(Some(user)) => Destination::User(user.id),
                Ok(None) => {
                    return errors::json_error(
                        StatusCode::NOT_FOUND,
                        "not_found",
                        "recipient not found",
                    )
                }
                Err(e) => return errors::user_error_to_response(e),
            }
        }
        dto::DestinationDto::External { recipient } => Destination::External(recipient),
    };

    match services
        .transfers
        .transfer(ctx.user_id(), body.source_account_id, destination, amount, key)
        .await
    {
        Ok(receipt) => {
            let status = if receipt.replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(dto::receipt_to_json(&receipt))).into_response()
        }
        Err(e) => errors::transfer_error_to_response(e),
    }
}
