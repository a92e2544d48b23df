//! The Scanning Worker contract driven by the orchestrator.

use async_trait::async_trait;
use serde::Deserialize;

use crate::api::{ScannerApi, ScannerApiError};

/// Coarse worker-side state of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Accepted and queued or running on the worker.
    Started,
    Completed,
    /// Worker gave up; carries its error text when it sent one.
    Failed(Option<String>),
}

impl WorkerStatus {
    /// Map the worker's wire status. `queued` and `scanning` both mean the
    /// scan is still in progress, as does any status this client does not
    /// recognise.
    pub fn from_wire(status: &str, error: Option<String>) -> Self {
        match status {
            "completed" => Self::Completed,
            "failed" => Self::Failed(error.filter(|e| !e.trim().is_empty())),
            _ => Self::Started,
        }
    }
}

/// One route as reported by the worker.
///
/// Structured fields the worker omits (or sends as `null`) come through as
/// `None` and are defaulted when the endpoint is stored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedEndpoint {
    pub path: String,
    pub method: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub responses: Option<serde_json::Value>,
    #[serde(default)]
    pub auth_required: Option<bool>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub line_number: Option<i32>,
    #[serde(default)]
    pub code_snippet: Option<String>,
}

/// Errors surfaced by a [`ScanningWorker`].
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker could not be reached or did not answer in time.
    #[error("scanning worker unreachable: {0}")]
    Unreachable(String),

    /// The worker answered with a non-2xx status.
    #[error("scanning worker rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<ScannerApiError> for WorkerError {
    fn from(err: ScannerApiError) -> Self {
        match err {
            ScannerApiError::Request(e) => WorkerError::Unreachable(e.to_string()),
            ScannerApiError::ApiError { status, body } => WorkerError::Rejected { status, body },
        }
    }
}

/// External service that clones a repository and detects its endpoints.
#[async_trait]
pub trait ScanningWorker: Send + Sync {
    /// Submit a scan and return the worker's scan ID.
    async fn start(&self, source_url: &str, branch: &str) -> Result<String, WorkerError>;

    async fn status(&self, scan_id: &str) -> Result<WorkerStatus, WorkerError>;

    /// Endpoints of a completed scan.
    async fn results(&self, scan_id: &str) -> Result<Vec<DetectedEndpoint>, WorkerError>;
}

#[async_trait]
impl ScanningWorker for ScannerApi {
    async fn start(&self, source_url: &str, branch: &str) -> Result<String, WorkerError> {
        let accepted = self.start_scan(source_url, branch).await?;
        tracing::debug!(
            worker_scan_id = %accepted.scan_id,
            status = %accepted.status,
            "Scanning worker accepted scan",
        );
        Ok(accepted.scan_id)
    }

    async fn status(&self, scan_id: &str) -> Result<WorkerStatus, WorkerError> {
        let status = self.get_status(scan_id).await?;
        Ok(WorkerStatus::from_wire(&status.status, status.error))
    }

    async fn results(&self, scan_id: &str) -> Result<Vec<DetectedEndpoint>, WorkerError> {
        let response = self.get_endpoints(scan_id).await?;
        Ok(response.endpoints.unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
