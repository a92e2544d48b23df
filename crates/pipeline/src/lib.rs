//! Scan lifecycle orchestration.
//!
//! [`ScanOrchestrator`] ties the admission controller, the storage gateway and
//! the scanning worker together: it accepts scan requests, waits for a slot,
//! drives the worker through start/poll/results and records the outcome.

pub mod error;
pub mod mapping;
pub mod orchestrator;

pub use error::{OrchestratorError, ScanFailure};
pub use orchestrator::{OrchestratorConfig, ScanAccepted, ScanOrchestrator, ScanStatusView};
