use std::sync::Arc;

use autodoc_db::store::Store;
use autodoc_pipeline::ScanOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc` or already shared.
#[derive(Clone)]
pub struct AppState {
    /// Storage gateway (Postgres or in-memory).
    pub store: Arc<dyn Store>,
    /// Scan lifecycle orchestrator and its admission controller.
    pub orchestrator: ScanOrchestrator,
    pub config: Arc<ServerConfig>,
}
