//! Integration tests for the scan orchestrator.
//!
//! Runs the real admission controller and in-memory store against a scripted
//! scanning worker, on a paused Tokio clock so poll intervals and the scan
//! timeout elapse instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use autodoc_core::admission::{AdmissionConfig, AdmissionController, JobId, JobStatus};
use autodoc_core::scanning::ScanStatus;
use autodoc_core::types::DbId;
use autodoc_db::models::activity::{Activity, CreateActivity};
use autodoc_db::models::endpoint::{CreateEndpoint, Endpoint, UpdateEndpoint};
use autodoc_db::models::repository::{CreateRepository, Repository, UpdateRepository};
use autodoc_db::store::{MemoryStore, Store, StoreBackend, StoreError, StoreResult};
use autodoc_pipeline::error::{ORPHANED_SCAN_REASON, SHUTDOWN_REASON};
use autodoc_pipeline::{OrchestratorConfig, OrchestratorError, ScanOrchestrator};
use autodoc_scanner::{DetectedEndpoint, ScanningWorker, WorkerError, WorkerStatus};
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scripted worker
// ---------------------------------------------------------------------------

/// How the fake worker treats scans of one source URL.
#[derive(Debug, Clone)]
enum Behavior {
    /// Report `completed` on the first poll with these endpoints.
    Complete(Vec<DetectedEndpoint>),
    /// Fail `errors` polls with a transport error, then complete.
    Flaky { errors: usize, endpoints: Vec<DetectedEndpoint> },
    Fail(Option<String>),
    /// Report `started` forever.
    Hang,
    /// Refuse the start call.
    RejectStart(String),
    /// Never answer the start call.
    HangStart,
    /// Take this long to answer the first poll, then report `started` forever.
    SlowFirstPoll(Duration),
    /// Report `completed`, but fail `errors` results fetches first.
    FlakyResults { errors: usize, endpoints: Vec<DetectedEndpoint> },
}

#[derive(Default)]
struct FakeWorker {
    behaviors: Mutex<HashMap<String, Behavior>>,
    /// (source_url, branch) of every start call.
    starts: Mutex<Vec<(String, String)>>,
    /// Clock reading at the start of every status call.
    polls: Mutex<Vec<Instant>>,
}

impl FakeWorker {
    fn set(&self, source_url: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(source_url.to_string(), behavior);
    }

    fn behavior(&self, scan_id: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(scan_id)
            .cloned()
            .unwrap_or(Behavior::Complete(Vec::new()))
    }

    fn starts(&self) -> Vec<(String, String)> {
        self.starts.lock().unwrap().clone()
    }

    fn polls(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanningWorker for FakeWorker {
    async fn start(&self, source_url: &str, branch: &str) -> Result<String, WorkerError> {
        self.starts
            .lock()
            .unwrap()
            .push((source_url.to_string(), branch.to_string()));
        match self.behavior(source_url) {
            Behavior::RejectStart(msg) => Err(WorkerError::Unreachable(msg)),
            Behavior::HangStart => std::future::pending().await,
            // The source URL doubles as the worker scan ID.
            _ => Ok(source_url.to_string()),
        }
    }

    async fn status(&self, scan_id: &str) -> Result<WorkerStatus, WorkerError> {
        self.polls.lock().unwrap().push(Instant::now());

        let slow = {
            let mut behaviors = self.behaviors.lock().unwrap();
            match behaviors.get(scan_id) {
                Some(Behavior::SlowFirstPoll(delay)) => {
                    let delay = *delay;
                    behaviors.insert(scan_id.to_string(), Behavior::Hang);
                    Some(delay)
                }
                _ => None,
            }
        };
        if let Some(delay) = slow {
            tokio::time::sleep(delay).await;
            return Ok(WorkerStatus::Started);
        }

        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(scan_id) {
            Some(Behavior::Hang) => Ok(WorkerStatus::Started),
            Some(Behavior::Fail(reason)) => Ok(WorkerStatus::Failed(reason.clone())),
            Some(Behavior::Flaky { errors, .. }) if *errors > 0 => {
                *errors -= 1;
                Err(WorkerError::Unreachable("connection reset".into()))
            }
            _ => Ok(WorkerStatus::Completed),
        }
    }

    async fn results(&self, scan_id: &str) -> Result<Vec<DetectedEndpoint>, WorkerError> {
        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(scan_id) {
            Some(Behavior::FlakyResults { errors, .. }) if *errors > 0 => {
                *errors -= 1;
                Err(WorkerError::Rejected {
                    status: 503,
                    body: "results not ready".into(),
                })
            }
            Some(
                Behavior::Complete(endpoints)
                | Behavior::Flaky { endpoints, .. }
                | Behavior::FlakyResults { endpoints, .. },
            ) => Ok(endpoints.clone()),
            _ => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Unreliable storage
// ---------------------------------------------------------------------------

/// [`MemoryStore`] wrapper whose repository updates, endpoint replacement and
/// activity writes can be switched to fail with `Unavailable`.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_repository_updates: AtomicBool,
    fail_endpoint_replace: AtomicBool,
    fail_activities: AtomicBool,
}

fn outage(flag: &AtomicBool) -> StoreResult<()> {
    if flag.load(Ordering::SeqCst) {
        Err(StoreError::Unavailable("connection refused".into()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    async fn find_repository(&self, id: DbId) -> StoreResult<Option<Repository>> {
        self.inner.find_repository(id).await
    }

    async fn list_repositories(&self, tenant_id: DbId) -> StoreResult<Vec<Repository>> {
        self.inner.list_repositories(tenant_id).await
    }

    async fn create_repository(&self, input: &CreateRepository) -> StoreResult<Repository> {
        self.inner.create_repository(input).await
    }

    async fn update_repository(
        &self,
        id: DbId,
        input: &UpdateRepository,
    ) -> StoreResult<Option<Repository>> {
        outage(&self.fail_repository_updates)?;
        self.inner.update_repository(id, input).await
    }

    async fn delete_repository(&self, id: DbId) -> StoreResult<bool> {
        self.inner.delete_repository(id).await
    }

    async fn find_endpoint(&self, id: DbId) -> StoreResult<Option<Endpoint>> {
        self.inner.find_endpoint(id).await
    }

    async fn list_endpoints(&self, repository_id: DbId) -> StoreResult<Vec<Endpoint>> {
        self.inner.list_endpoints(repository_id).await
    }

    async fn create_endpoint(
        &self,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> StoreResult<Endpoint> {
        self.inner.create_endpoint(repository_id, input).await
    }

    async fn update_endpoint(
        &self,
        id: DbId,
        input: &UpdateEndpoint,
    ) -> StoreResult<Option<Endpoint>> {
        self.inner.update_endpoint(id, input).await
    }

    async fn delete_endpoints(&self, repository_id: DbId) -> StoreResult<u64> {
        self.inner.delete_endpoints(repository_id).await
    }

    async fn replace_endpoints(
        &self,
        repository_id: DbId,
        endpoints: &[CreateEndpoint],
    ) -> StoreResult<Vec<Endpoint>> {
        outage(&self.fail_endpoint_replace)?;
        self.inner.replace_endpoints(repository_id, endpoints).await
    }

    async fn list_activities(&self, repository_id: DbId) -> StoreResult<Vec<Activity>> {
        self.inner.list_activities(repository_id).await
    }

    async fn list_tenant_activities(
        &self,
        tenant_id: DbId,
        limit: i64,
    ) -> StoreResult<Vec<Activity>> {
        self.inner.list_tenant_activities(tenant_id, limit).await
    }

    async fn create_activity(&self, input: &CreateActivity) -> StoreResult<Activity> {
        outage(&self.fail_activities)?;
        self.inner.create_activity(input).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    orchestrator: ScanOrchestrator,
    store: Arc<MemoryStore>,
    worker: Arc<FakeWorker>,
}

fn harness(max_global: usize, max_per_tenant: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let worker = Arc::new(FakeWorker::default());
    let admission = Arc::new(AdmissionController::new(AdmissionConfig {
        max_global,
        max_per_tenant,
        retention_cap: 100,
    }));
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        worker.clone(),
        admission,
        OrchestratorConfig::default(),
    );
    Harness {
        orchestrator,
        store,
        worker,
    }
}

/// Like [`harness`], but over a [`FlakyStore`] the test can break.
fn flaky_harness() -> (ScanOrchestrator, Arc<FlakyStore>, Arc<FakeWorker>) {
    let store = Arc::new(FlakyStore::default());
    let worker = Arc::new(FakeWorker::default());
    let admission = Arc::new(AdmissionController::new(AdmissionConfig {
        max_global: 5,
        max_per_tenant: 2,
        retention_cap: 100,
    }));
    let orchestrator = ScanOrchestrator::new(
        store.clone(),
        worker.clone(),
        admission,
        OrchestratorConfig::default(),
    );
    (orchestrator, store, worker)
}

async fn create_repo(store: &MemoryStore, tenant_id: DbId, name: &str) -> Repository {
    store
        .create_repository(&CreateRepository {
            tenant_id,
            name: name.to_string(),
            full_name: format!("acme/{name}"),
            repo_url: format!("https://github.com/acme/{name}"),
            default_branch: None,
        })
        .await
        .unwrap()
}

fn detected(path: &str, method: &str) -> DetectedEndpoint {
    DetectedEndpoint {
        path: path.to_string(),
        method: method.to_string(),
        summary: None,
        description: None,
        tags: Some(vec!["generated".to_string()]),
        parameters: None,
        responses: None,
        auth_required: None,
        file_path: Some("app/routes.py".to_string()),
        line_number: Some(1),
        code_snippet: None,
    }
}

/// Sleep on the paused clock until no job is queued or processing.
async fn wait_idle(orchestrator: &ScanOrchestrator) {
    for _ in 0..10_000 {
        let stats = orchestrator.queue_stats();
        if stats.queued_count == 0 && stats.processing_count == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("scans did not settle: {:?}", orchestrator.queue_stats());
}

async fn wait_for_job(orchestrator: &ScanOrchestrator, job_id: JobId, status: JobStatus) {
    for _ in 0..10_000 {
        if orchestrator.admission().job(job_id).map(|j| j.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {job_id} never reached {status}");
}

async fn wait_for_scan_status(store: &MemoryStore, repository_id: DbId, status: ScanStatus) {
    for _ in 0..10_000 {
        let repo = store.find_repository(repository_id).await.unwrap().unwrap();
        if repo.scan_status() == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("repository {repository_id} never reached {status}");
}

async fn reload(store: &MemoryStore, repository_id: DbId) -> Repository {
    store.find_repository(repository_id).await.unwrap().unwrap()
}

// ---------------------------------------------------------------------------
// Admission scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn global_cap_queues_then_promotes_on_completion() {
    let h = harness(1, 2);
    let tenant = Uuid::new_v4();
    let a = create_repo(&h.store, tenant, "a").await;
    let b = create_repo(&h.store, tenant, "b").await;
    h.worker.set(&a.repo_url, Behavior::Hang);

    let job_a = h.orchestrator.request_scan(a.id, tenant).await.unwrap();
    let job_b = h.orchestrator.request_scan(b.id, tenant).await.unwrap();
    assert_eq!(job_a.status, JobStatus::Processing);
    assert_eq!(job_b.status, JobStatus::Queued);

    let stats = h.orchestrator.queue_stats();
    assert_eq!(stats.active_global, 1);
    assert_eq!(stats.queued_count, 1);

    wait_for_scan_status(&h.store, a.id, ScanStatus::Scanning).await;
    assert_eq!(reload(&h.store, b.id).await.scan_status(), ScanStatus::Pending);

    h.worker.set(&a.repo_url, Behavior::Complete(Vec::new()));
    wait_idle(&h.orchestrator).await;

    let admission = h.orchestrator.admission();
    let done_a = admission.job(job_a.job_id).unwrap();
    let done_b = admission.job(job_b.job_id).unwrap();
    assert_eq!(done_a.status, JobStatus::Completed);
    assert_eq!(done_b.status, JobStatus::Completed);
    assert!(done_b.started_at.unwrap() >= done_a.completed_at.unwrap());

    let stats = h.orchestrator.queue_stats();
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.completed_count, 2);
    assert_eq!(reload(&h.store, b.id).await.scan_status(), ScanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn tenant_cap_holds_third_scan_until_a_slot_frees() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let mut repos = Vec::new();
    for name in ["one", "two", "three"] {
        let repo = create_repo(&h.store, tenant, name).await;
        h.worker.set(&repo.repo_url, Behavior::Hang);
        repos.push(repo);
    }

    let mut jobs = Vec::new();
    for repo in &repos {
        jobs.push(h.orchestrator.request_scan(repo.id, tenant).await.unwrap());
    }
    assert_eq!(jobs[0].status, JobStatus::Processing);
    assert_eq!(jobs[1].status, JobStatus::Processing);
    assert_eq!(jobs[2].status, JobStatus::Queued);
    assert_eq!(h.orchestrator.admission().tenant_active(tenant), 2);

    // Another tenant is not held back by the first tenant's cap.
    let other = Uuid::new_v4();
    let other_repo = create_repo(&h.store, other, "other").await;
    let other_job = h.orchestrator.request_scan(other_repo.id, other).await.unwrap();
    assert_eq!(other_job.status, JobStatus::Processing);

    h.worker.set(&repos[0].repo_url, Behavior::Complete(Vec::new()));
    wait_for_job(&h.orchestrator, jobs[2].job_id, JobStatus::Processing).await;
    assert_eq!(h.orchestrator.admission().tenant_active(tenant), 2);

    for repo in &repos[1..] {
        h.worker.set(&repo.repo_url, Behavior::Complete(Vec::new()));
    }
    wait_idle(&h.orchestrator).await;
    assert_eq!(h.orchestrator.queue_stats().active_global, 0);
}

// ---------------------------------------------------------------------------
// Lifecycle outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_failure_marks_failed_and_frees_slot() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker
        .set(&repo.repo_url, Behavior::RejectStart("connection refused".into()));

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Failed);
    let message = repo.scan_error_message.unwrap();
    assert!(message.contains("connection refused"), "{message}");

    let activities = h.store.list_activities(repo.id).await.unwrap();
    let kinds: Vec<_> = activities.iter().map(|a| a.activity_type.as_str()).collect();
    assert_eq!(kinds, vec!["scan_started", "scan_failed"]);
    assert_eq!(activities[1].metadata["error"], json!(message));

    let stats = h.orchestrator.queue_stats();
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.failed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn completed_scan_replaces_endpoints_and_records_count() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;

    let stale = CreateEndpoint {
        path: "/stale".to_string(),
        method: "GET".to_string(),
        summary: String::new(),
        description: String::new(),
        tags: Vec::new(),
        parameters: json!([]),
        responses: json!({}),
        auth_required: false,
        file_path: None,
        line_number: None,
        code_snippet: None,
    };
    h.store
        .replace_endpoints(repo.id, &[stale.clone(), CreateEndpoint { path: "/old".into(), ..stale }])
        .await
        .unwrap();

    let found: Vec<_> = (1..=7)
        .map(|i| detected(&format!("/v1/items/{i}"), "get"))
        .collect();
    h.worker.set(&repo.repo_url, Behavior::Complete(found));

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Completed);
    assert_eq!(repo.endpoint_count, 7);
    assert!(repo.last_scanned_at.is_some());
    assert_eq!(repo.scan_error_message, None);

    let endpoints = h.store.list_endpoints(repo.id).await.unwrap();
    assert_eq!(endpoints.len(), 7);
    assert!(endpoints.iter().all(|e| e.method == "GET"));
    assert!(endpoints.iter().all(|e| e.path.starts_with("/v1/items/")));

    let activities = h.store.list_activities(repo.id).await.unwrap();
    let completed = activities
        .iter()
        .find(|a| a.activity_type == "scan_completed")
        .unwrap();
    assert_eq!(completed.metadata["endpointCount"], json!(7));
}

#[tokio::test(start_paused = true)]
async fn worker_reported_failure_is_recorded() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker
        .set(&repo.repo_url, Behavior::Fail(Some("clone failed".into())));

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Failed);
    assert_eq!(repo.scan_error_message.as_deref(), Some("clone failed"));
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(
        &repo.repo_url,
        Behavior::Flaky {
            errors: 3,
            endpoints: vec![detected("/health", "get")],
        },
    );

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Completed);
    assert_eq!(repo.endpoint_count, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_worker_times_out_after_five_minutes() {
    let h = harness(1, 1);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(&repo.repo_url, Behavior::Hang);

    let started = Instant::now();
    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(301), "{elapsed:?}");

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Failed);
    assert_eq!(repo.scan_error_message.as_deref(), Some("timeout exceeded"));
    assert_eq!(h.orchestrator.queue_stats().active_global, 0);

    let failed = h
        .store
        .list_activities(repo.id)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.activity_type == "scan_failed")
        .unwrap();
    assert_eq!(failed.metadata["kind"], json!("timeout"));
}

#[tokio::test(start_paused = true)]
async fn unanswered_start_times_out_and_frees_slot() {
    let h = harness(1, 1);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(&repo.repo_url, Behavior::HangStart);

    let started = Instant::now();
    let accepted = h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(301), "{elapsed:?}");

    let stats = h.orchestrator.queue_stats();
    assert_eq!(stats.processing_count, 0);
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.failed_count, 1);
    let job = h.orchestrator.admission().job(accepted.job_id).unwrap();
    assert_eq!(job.error.as_deref(), Some("timeout exceeded"));

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Failed);
    assert_eq!(repo.scan_error_message.as_deref(), Some("timeout exceeded"));
}

#[tokio::test(start_paused = true)]
async fn slow_poll_is_not_followed_by_a_burst() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker
        .set(&repo.repo_url, Behavior::SlowFirstPoll(Duration::from_secs(10)));

    let started = Instant::now();
    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    tokio::time::sleep(Duration::from_secs(17)).await;

    // First poll at 2s answers at 12s; later polls resume 2s apart.
    let polls = h.worker.polls();
    let offsets: Vec<_> = polls.iter().map(|p| p.duration_since(started)).collect();
    assert_eq!(polls.len(), 4, "{offsets:?}");
    for pair in polls.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(1990), "polls only {gap:?} apart");
    }

    h.worker.set(&repo.repo_url, Behavior::Complete(Vec::new()));
    wait_idle(&h.orchestrator).await;
    assert_eq!(reload(&h.store, repo.id).await.scan_status(), ScanStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn failed_results_fetch_is_retried() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(
        &repo.repo_url,
        Behavior::FlakyResults {
            errors: 2,
            endpoints: vec![detected("/orders", "post")],
        },
    );

    let accepted = h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    // One status poll per results attempt.
    assert_eq!(h.worker.polls().len(), 3);
    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Completed);
    assert_eq!(repo.endpoint_count, 1);
    assert_eq!(
        h.orchestrator.admission().job(accepted.job_id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn default_branch_is_sent_to_worker() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    assert_eq!(h.worker.starts(), vec![(repo.repo_url.clone(), "main".to_string())]);
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn second_request_while_active_conflicts() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(&repo.repo_url, Behavior::Hang);

    let first = h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    let err = h.orchestrator.request_scan(repo.id, tenant).await.unwrap_err();
    assert_matches!(err, OrchestratorError::ScanAlreadyActive { job_id, .. } if job_id == first.job_id);

    h.worker.set(&repo.repo_url, Behavior::Complete(Vec::new()));
    wait_idle(&h.orchestrator).await;
    assert_eq!(h.orchestrator.queue_stats().completed_count, 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_or_foreign_repository_is_not_found() {
    let h = harness(5, 2);
    let owner = Uuid::new_v4();
    let repo = create_repo(&h.store, owner, "api").await;

    let err = h
        .orchestrator
        .request_scan(Uuid::new_v4(), owner)
        .await
        .unwrap_err();
    assert_matches!(err, OrchestratorError::RepositoryNotFound(_));

    let err = h
        .orchestrator
        .request_scan(repo.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, OrchestratorError::RepositoryNotFound(id) if id == repo.id);
    assert_eq!(h.orchestrator.queue_stats().queued_count, 0);
}

#[tokio::test(start_paused = true)]
async fn rescan_replaces_previous_results() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;

    h.worker.set(
        &repo.repo_url,
        Behavior::Complete(vec![detected("/a", "get"), detected("/b", "get")]),
    );
    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&h.orchestrator).await;

    h.worker
        .set(&repo.repo_url, Behavior::Complete(vec![detected("/c", "post")]));
    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    assert_eq!(reload(&h.store, repo.id).await.scan_status(), ScanStatus::Pending);
    wait_idle(&h.orchestrator).await;

    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Completed);
    assert_eq!(repo.endpoint_count, 1);
    let endpoints = h.store.list_endpoints(repo.id).await.unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!((endpoints[0].path.as_str(), endpoints[0].method.as_str()), ("/c", "POST"));
}

// ---------------------------------------------------------------------------
// Status view and shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scan_status_reports_active_job() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.worker.set(&repo.repo_url, Behavior::Hang);

    let accepted = h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_for_scan_status(&h.store, repo.id, ScanStatus::Scanning).await;

    let view = h.orchestrator.scan_status(repo.id, Some(tenant)).await.unwrap();
    assert_eq!(view.status, ScanStatus::Scanning);
    assert_eq!(view.active_job.map(|j| j.id), Some(accepted.job_id));

    let err = h
        .orchestrator
        .scan_status(repo.id, Some(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_matches!(err, OrchestratorError::RepositoryNotFound(_));

    h.worker.set(&repo.repo_url, Behavior::Complete(Vec::new()));
    wait_idle(&h.orchestrator).await;
    let view = h.orchestrator.scan_status(repo.id, None).await.unwrap();
    assert_eq!(view.status, ScanStatus::Completed);
    assert!(view.active_job.is_none());
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_running_and_withdraws_queued() {
    let h = harness(1, 1);
    let tenant = Uuid::new_v4();
    let running = create_repo(&h.store, tenant, "running").await;
    let waiting = create_repo(&h.store, tenant, "waiting").await;
    h.worker.set(&running.repo_url, Behavior::Hang);

    h.orchestrator.request_scan(running.id, tenant).await.unwrap();
    let queued = h.orchestrator.request_scan(waiting.id, tenant).await.unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    wait_for_scan_status(&h.store, running.id, ScanStatus::Scanning).await;

    assert!(h.orchestrator.shutdown(Duration::from_secs(30)).await);

    for id in [running.id, waiting.id] {
        let repo = reload(&h.store, id).await;
        assert_eq!(repo.scan_status(), ScanStatus::Failed);
        assert_eq!(repo.scan_error_message.as_deref(), Some(SHUTDOWN_REASON));
    }
    // The queued scan never reached the worker.
    assert_eq!(h.worker.starts().len(), 1);

    let stats = h.orchestrator.queue_stats();
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.failed_count, 2);

    let err = h.orchestrator.request_scan(running.id, tenant).await.unwrap_err();
    assert_matches!(err, OrchestratorError::ShuttingDown);
}

// ---------------------------------------------------------------------------
// Storage outages
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn status_and_activity_outage_still_frees_slot() {
    let (orchestrator, store, worker) = flaky_harness();
    let tenant = Uuid::new_v4();
    let repo = create_repo(&store.inner, tenant, "api").await;
    worker.set(&repo.repo_url, Behavior::Complete(vec![detected("/users", "get")]));

    let accepted = orchestrator.request_scan(repo.id, tenant).await.unwrap();
    store.fail_repository_updates.store(true, Ordering::SeqCst);
    store.fail_activities.store(true, Ordering::SeqCst);
    wait_idle(&orchestrator).await;

    let stats = orchestrator.queue_stats();
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.completed_count, 1);
    assert_eq!(
        orchestrator.admission().job(accepted.job_id).unwrap().status,
        JobStatus::Completed
    );
    assert!(!orchestrator.admission().has_active_job(repo.id));

    // Results landed even though status writes did not.
    assert_eq!(store.list_endpoints(repo.id).await.unwrap().len(), 1);
    assert!(store.list_activities(repo.id).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn endpoint_store_outage_fails_scan() {
    let (orchestrator, store, worker) = flaky_harness();
    let tenant = Uuid::new_v4();
    let repo = create_repo(&store.inner, tenant, "api").await;
    worker.set(&repo.repo_url, Behavior::Complete(vec![detected("/users", "get")]));
    store.fail_endpoint_replace.store(true, Ordering::SeqCst);

    let accepted = orchestrator.request_scan(repo.id, tenant).await.unwrap();
    wait_idle(&orchestrator).await;

    let job = orchestrator.admission().job(accepted.job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(orchestrator.queue_stats().active_global, 0);

    let repo = reload(&store.inner, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Failed);
    let message = repo.scan_error_message.unwrap();
    assert!(message.contains("connection refused"), "{message}");

    let failed = store
        .list_activities(repo.id)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.activity_type == "scan_failed")
        .unwrap();
    assert_eq!(failed.metadata["kind"], json!("storage_unavailable"));
}

#[tokio::test(start_paused = true)]
async fn request_fails_when_pending_cannot_be_written() {
    let (orchestrator, store, _worker) = flaky_harness();
    let tenant = Uuid::new_v4();
    let repo = create_repo(&store.inner, tenant, "api").await;
    store
        .inner
        .update_repository(repo.id, &UpdateRepository::status(ScanStatus::Completed))
        .await
        .unwrap();
    store.fail_repository_updates.store(true, Ordering::SeqCst);

    let err = orchestrator.request_scan(repo.id, tenant).await.unwrap_err();
    assert_matches!(err, OrchestratorError::Store(StoreError::Unavailable(_)));

    let stats = orchestrator.queue_stats();
    assert_eq!(stats.active_global, 0);
    assert_eq!(stats.queued_count, 0);
    assert!(!orchestrator.admission().has_active_job(repo.id));
}

// ---------------------------------------------------------------------------
// Status transitions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn orphaned_scanning_row_is_failed_then_rescanned() {
    let h = harness(5, 2);
    let tenant = Uuid::new_v4();
    let repo = create_repo(&h.store, tenant, "api").await;
    h.store
        .update_repository(repo.id, &UpdateRepository::status(ScanStatus::Scanning))
        .await
        .unwrap();
    h.worker
        .set(&repo.repo_url, Behavior::Complete(vec![detected("/users", "get")]));

    h.orchestrator.request_scan(repo.id, tenant).await.unwrap();
    let pending = reload(&h.store, repo.id).await;
    assert_eq!(pending.scan_status(), ScanStatus::Pending);
    assert_eq!(pending.scan_error_message.as_deref(), Some(ORPHANED_SCAN_REASON));

    wait_idle(&h.orchestrator).await;
    let repo = reload(&h.store, repo.id).await;
    assert_eq!(repo.scan_status(), ScanStatus::Completed);
    assert_eq!(repo.scan_error_message, None);
}
