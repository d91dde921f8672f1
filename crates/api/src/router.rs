//! Core router assembly, shared by `main` and the integration tests.
//!
//! Middleware (tracing, CORS, timeouts, panic recovery) is layered on
//! in `main`; tests exercise the bare route tree.

use axum::Router;

use crate::routes;
use crate::state::AppState;

/// Compose the full route tree over the given state.
pub fn build(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .with_state(state)
}
