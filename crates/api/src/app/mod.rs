//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: control panel operations, store selection, event listener
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: form parsing, validation and view models
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use boardcp_auth::{Hs256JwtValidator, JwtValidator};

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));
    Ok(router(Arc::new(services), jwt))
}

/// Router over already built services.
pub fn router(services: Arc<services::AppServices>, jwt: Arc<dyn JwtValidator>) -> Router {
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
