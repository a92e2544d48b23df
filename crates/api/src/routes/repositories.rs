//! Route definitions for repository scans.

use axum::routing::post;
use axum::Router;

use crate::handlers::scan;
use crate::state::AppState;

/// Routes mounted at `/repositories`.
///
/// ```text
/// POST /{id}/scan  -> request_scan
/// GET  /{id}/scan  -> get_scan_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{id}/scan",
        post(scan::request_scan).get(scan::get_scan_status),
    )
}
