//! Handlers for repository scans.
//!
//! Requesting a scan only registers it with the orchestrator; the worker is
//! driven in the background and the outcome shows up through
//! `GET /repositories/{id}/scan`.

use autodoc_core::error::CoreError;
use autodoc_core::types::DbId;
use autodoc_pipeline::{ScanAccepted, ScanStatusView};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /repositories/{id}/scan.
#[derive(Debug, Deserialize)]
pub struct RequestScanBody {
    pub tenant_id: DbId,
}

/// Query string for GET /repositories/{id}/scan.
#[derive(Debug, Deserialize)]
pub struct ScanStatusQuery {
    /// When given, repositories of other tenants read as not found.
    pub tenant_id: Option<DbId>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/repositories/{id}/scan
///
/// Returns 202 with the admission job as soon as the scan is registered.
pub async fn request_scan(
    State(state): State<AppState>,
    Path(repository_id): Path<DbId>,
    Json(body): Json<RequestScanBody>,
) -> AppResult<impl IntoResponse> {
    if body.tenant_id.is_nil() {
        return Err(CoreError::Validation("tenant_id must not be nil".into()).into());
    }

    let accepted: ScanAccepted = state
        .orchestrator
        .request_scan(repository_id, body.tenant_id)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// GET /api/v1/repositories/{id}/scan
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(repository_id): Path<DbId>,
    Query(query): Query<ScanStatusQuery>,
) -> AppResult<Json<DataResponse<ScanStatusView>>> {
    let view = state
        .orchestrator
        .scan_status(repository_id, query.tenant_id)
        .await?;
    Ok(Json(DataResponse { data: view }))
}
