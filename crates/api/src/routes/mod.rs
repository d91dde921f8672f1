pub mod health;
pub mod jobs;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                      POST submit
/// /jobs/{id}                 GET  job view + paginated task summaries
/// /tasks/{id}/result         GET  terminal result reference
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/tasks", tasks::router())
}
