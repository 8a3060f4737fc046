use axum::{routing::get, Router};

pub mod roles;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/cp/boards/:board/roles", roles::router())
}
