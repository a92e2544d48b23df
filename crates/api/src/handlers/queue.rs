//! Handlers for the scan admission queue.

use autodoc_core::admission::QueueStats;
use axum::extract::State;
use axum::Json;

use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue
///
/// Snapshot of the admission controller: queued, processing and retained
/// terminal job counts plus the configured caps.
pub async fn get_queue_stats(State(state): State<AppState>) -> Json<DataResponse<QueueStats>> {
    Json(DataResponse {
        data: state.orchestrator.queue_stats(),
    })
}
