//! Route definitions for the scan admission queue.

use axum::routing::get;
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queue`.
///
/// ```text
/// GET  /  -> get_queue_stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(queue::get_queue_stats))
}
