//! Saved recipients.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use walletcore_core::ContactId;
use walletcore_infra::Contact;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/", get(list).post(create))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> axum::response::Response {
    match services.users.contacts_for(ctx.user_id()).await {
        Ok(contacts) => {
            let items: Vec<_> = contacts.iter().map(dto::contact_to_json).collect();
            Json(json!({ "items": items })).into_response()
        }
        Err(e) => errors::user_error_to_response(e),
    }
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
    Json(body): Json<dto::CreateContactRequest>,
) -> axum::response::Response {
    if body.name.trim().is_empty() {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            "contact name must not be empty",
        );
    }
    // Contacts must point at real users, so transfers to them can resolve.
    match services.users.user_by_username(&body.username).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found")
        }
        Err(e) => return errors::user_error_to_response(e),
    }

    let contact = Contact {
        id: ContactId::new(),
        user_id: ctx.user_id(),
        name: body.name.trim().to_string(),
        username: body.username,
    };
    match services.users.add_contact(contact).await {
        Ok(contact) => {
            (StatusCode::CREATED, Json(dto::contact_to_json(&contact))).into_response()
        }
        Err(e) => errors::user_error_to_response(e),
    }
}
