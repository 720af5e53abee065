//! Signup, login, logout, and profile.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use walletcore_auth::{verify_password, NewUser, Session, SessionToken, User};
use walletcore_core::Currency;
use walletcore_ledger::Account;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::UserContext;

pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::SignupRequest>,
) -> axum::response::Response {
    let user = match User::register(NewUser {
        display_name: body.display_name,
        email: body.email,
        username: body.username,
        password: body.password,
        phone: body.phone,
    }) {
        Ok(u) => u,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let user = match services.users.create_user(user).await {
        Ok(u) => u,
        Err(e) => return errors::user_error_to_response(e),
    };

    // Every user starts with one primary account.
    let account = Account::new(user.id, "Main", Currency::Usd, true);
    if let Err(e) = services.ledger.create_account(account).await {
        return errors::ledger_error_to_response(e);
    }

    match open_session(&services, &user).await {
        Ok(token) => (
            StatusCode::CREATED,
            Json(json!({ "token": token.as_str(), "user": dto::user_to_json(&user) })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    let email = body.email.trim().to_ascii_lowercase();
    let user = match services.users.user_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => return invalid_credentials(),
        Err(e) => return errors::user_error_to_response(e),
    };

    if !verify_password(&body.password, &user.password_hash) {
        return invalid_credentials();
    }

    match open_session(&services, &user).await {
        Ok(token) => Json(
            json!({ "token": token.as_str(), "user": dto::user_to_json(&user) }),
        )
        .into_response(),
        Err(resp) => resp,
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<SessionToken>,
) -> axum::response::Response {
    match services.sessions.revoke(&token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> axum::response::Response {
    match services.users.user_by_id(ctx.user_id()).await {
        Ok(user) => Json(dto::user_to_json(&user)).into_response(),
        Err(e) => errors::user_error_to_response(e),
    }
}

async fn open_session(
    services: &AppServices,
    user: &User,
) -> Result<SessionToken, axum::response::Response> {
    let session = Session::issue(user.id, services.session_ttl);
    let token = session.token.clone();
    services
        .sessions
        .insert(session)
        .await
        .map_err(errors::ledger_error_to_response)?;
    Ok(token)
}

fn invalid_credentials() -> axum::response::Response {
    errors::json_error(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "invalid email or password",
    )
}
