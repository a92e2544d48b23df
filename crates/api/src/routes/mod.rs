pub mod health;
pub mod queue;
pub mod repositories;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /repositories/{id}/scan      request scan (POST), scan status (GET)
/// /queue                       admission queue stats (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/repositories", repositories::router())
        .nest("/queue", queue::router())
}
