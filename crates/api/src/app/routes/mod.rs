use axum::{
    routing::{get, post},
    Router,
};

pub mod accounts;
pub mod contacts;
pub mod identity;
pub mod requests;
pub mod system;
pub mod transfers;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/auth/logout", post(identity::logout))
        .route("/me", get(identity::me))
        .nest("/accounts", accounts::router())
        .route("/transfers", post(transfers::create))
        .nest("/contacts", contacts::router())
        .nest("/payment-requests", requests::router())
}
