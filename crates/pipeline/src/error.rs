use autodoc_core::admission::{AdmissionError, JobId};
use autodoc_core::types::DbId;
use autodoc_db::store::StoreError;

/// Reason recorded when shutdown interrupts a queued or running scan.
pub const SHUTDOWN_REASON: &str = "scan interrupted by shutdown";

/// Reason recorded on a `scanning` row found with no job driving it.
pub const ORPHANED_SCAN_REASON: &str = "scan abandoned before completion";

/// Errors returned synchronously to callers of the orchestrator.
///
/// Worker failures never appear here; they are recorded on the repository.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Unknown repository, or one owned by another tenant.
    #[error("Repository not found: {0}")]
    RepositoryNotFound(DbId),

    #[error("Repository {repository_id} already has an active scan ({job_id})")]
    ScanAlreadyActive { repository_id: DbId, job_id: JobId },

    #[error("Scan orchestrator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Admission(AdmissionError),
}

impl From<AdmissionError> for OrchestratorError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::AlreadyActive {
                repository_id,
                job_id,
            } => Self::ScanAlreadyActive {
                repository_id,
                job_id,
            },
            other => Self::Admission(other),
        }
    }
}

/// Why a scan ended in `failed`. The `Display` text is what gets stored as
/// the repository's error message and the `scan_failed` activity reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanFailure {
    /// The worker could not be asked to start the scan.
    #[error("{0}")]
    WorkerUnreachable(String),

    #[error("{0}")]
    WorkerReportedFailure(String),

    #[error("{}", autodoc_core::scanning::TIMEOUT_REASON)]
    Timeout,

    /// Results could not be persisted.
    #[error("failed to store scan results: {0}")]
    StorageUnavailable(String),

    #[error("{}", SHUTDOWN_REASON)]
    Interrupted,
}

impl ScanFailure {
    /// Stable machine-readable tag stored in activity metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkerUnreachable(_) => "worker_unreachable",
            Self::WorkerReportedFailure(_) => "worker_reported_failure",
            Self::Timeout => "timeout",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Interrupted => "interrupted",
        }
    }
}
