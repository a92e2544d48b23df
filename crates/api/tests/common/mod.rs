#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autodoc_core::admission::AdmissionController;
use autodoc_db::store::{MemoryStore, Store};
use autodoc_pipeline::{OrchestratorConfig, ScanOrchestrator};
use autodoc_scanner::{DetectedEndpoint, ScanningWorker, WorkerError, WorkerStatus};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use autodoc_api::config::ServerConfig;
use autodoc_api::router::build_app_router;
use autodoc_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: None,
        scanner_url: "http://localhost:3001".to_string(),
        max_concurrent_scans: 5,
        max_scans_per_tenant: 2,
        scan_history_limit: 100,
        scan_poll_interval_secs: 1,
        scan_timeout_secs: 300,
    }
}

/// Scanning worker double. Scans complete on the first poll with the
/// endpoints registered for their source URL; URLs marked as hanging stay
/// `started` forever.
#[derive(Default)]
pub struct StubWorker {
    endpoints: Mutex<HashMap<String, Vec<DetectedEndpoint>>>,
    hanging: Mutex<Vec<String>>,
}

impl StubWorker {
    pub fn with_endpoints(&self, source_url: &str, endpoints: Vec<DetectedEndpoint>) {
        self.endpoints
            .lock()
            .unwrap()
            .insert(source_url.to_string(), endpoints);
    }

    pub fn hang(&self, source_url: &str) {
        self.hanging.lock().unwrap().push(source_url.to_string());
    }
}

#[async_trait]
impl ScanningWorker for StubWorker {
    async fn start(&self, source_url: &str, _branch: &str) -> Result<String, WorkerError> {
        Ok(source_url.to_string())
    }

    async fn status(&self, scan_id: &str) -> Result<WorkerStatus, WorkerError> {
        if self.hanging.lock().unwrap().iter().any(|u| u == scan_id) {
            Ok(WorkerStatus::Started)
        } else {
            Ok(WorkerStatus::Completed)
        }
    }

    async fn results(&self, scan_id: &str) -> Result<Vec<DetectedEndpoint>, WorkerError> {
        Ok(self
            .endpoints
            .lock()
            .unwrap()
            .get(scan_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub worker: Arc<StubWorker>,
    pub orchestrator: ScanOrchestrator,
}

/// Build the full application router over an in-memory store and a stub
/// worker, with the same middleware stack production uses.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let worker = Arc::new(StubWorker::default());
    let admission = Arc::new(AdmissionController::new(config.admission_config()));

    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        worker.clone(),
        admission,
        OrchestratorConfig {
            poll_interval: Duration::from_millis(10),
            ..config.orchestrator_config()
        },
    );

    let state = AppState {
        store: store.clone() as Arc<dyn Store>,
        orchestrator: orchestrator.clone(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        worker,
        orchestrator,
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
