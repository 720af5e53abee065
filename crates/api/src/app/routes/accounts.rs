//! Account CRUD, freeze, deposits, and the transaction log.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use walletcore_core::{AccountId, TransferId};
use walletcore_infra::LogPage;
use walletcore_ledger::{Account, IdempotencyKey};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(show))
        .route("/:id/freeze", post(freeze))
        .route("/:id/deposit", post(deposit))
        .route("/:id/transactions", get(transactions))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> axum::response::Response {
    match services.ledger.accounts_for_owner(ctx.user_id()).await {
        Ok(accounts) => {
            let items: Vec<_> = accounts.iter().map(dto::account_to_json).collect();
            Json(json!({ "items": items })).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<dto::CreateAccountRequest>,
) -> axum::response::Response {
    if body.title.trim().is_empty() {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            "title must not be empty",
        );
    }
    let currency = match dto::parse_currency(&body.currency) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let account = Account::new(ctx.user_id(), body.title.trim(), currency, false);
    match services.ledger.create_account(account).await {
        Ok(account) => {
            (StatusCode::CREATED, Json(dto::account_to_json(&account))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Load an account and hide its existence from non-owners.
async fn owned_account(
    services: &AppServices,
    ctx: &UserContext,
    id: AccountId,
) -> Result<Account, axum::response::Response> {
    let account = services
        .ledger
        .account(id)
        .await
        .map_err(errors::ledger_error_to_response)?;
    if account.owner_id != ctx.user_id() {
        return Err(errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "account not found",
        ));
    }
    Ok(account)
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<AccountId>,
) -> axum::response::Response {
    match owned_account(&services, &ctx, id).await {
        Ok(account) => Json(dto::account_to_json(&account)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn freeze(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<AccountId>,
) -> axum::response::Response {
    if let Err(resp) = owned_account(&services, &ctx, id).await {
        return resp;
    }
    match services.ledger.freeze_account(id).await {
        Ok(account) => Json(dto::account_to_json(&account)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn deposit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<AccountId>,
    Json(body): Json<dto::DepositRequest>,
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

    match services.transfers.deposit(ctx.user_id(), id, amount, key).await {
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

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
    pub cursor: Option<TransferId>,
}

pub async fn transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<AccountId>,
    Query(query): Query<LogQuery>,
) -> axum::response::Response {
    if let Err(resp) = owned_account(&services, &ctx, id).await {
        return resp;
    }
    let page = LogPage::new(query.limit, query.cursor);
    match services.ledger.list_records(id, page).await {
        Ok(page) => {
            let items: Vec<_> = page.items.iter().map(dto::record_to_json).collect();
            Json(json!({ "items": items, "next_cursor": page.next_cursor })).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
