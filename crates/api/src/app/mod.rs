//! HTTP API application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: store wiring (in-memory vs Postgres) + background sweeps
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, routing::post, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: services::Config) -> Router {
    let app_services = Arc::new(services::build_services(&config).await);
    let auth_state = middleware::AuthState {
        gateway: app_services.gateway.clone(),
    };

    // Protected routes: require a resolvable session.
    let protected = routes::router()
        .layer(Extension(app_services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/auth/signup", post(routes::identity::signup))
        .route("/auth/login", post(routes::identity::login))
        .layer(Extension(app_services))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
