//! Client for the external Scanning Worker.
//!
//! - [`api`]: thin [`reqwest`] wrapper over the worker's HTTP endpoints.
//! - [`worker`]: the [`ScanningWorker`](worker::ScanningWorker) contract the
//!   orchestrator drives, implemented for [`ScannerApi`](api::ScannerApi).

pub mod api;
pub mod worker;

pub use api::{ScannerApi, ScannerApiError};
pub use worker::{DetectedEndpoint, ScanningWorker, WorkerError, WorkerStatus};
