//! Scan lifecycle orchestrator.
//!
//! Each accepted request becomes one Tokio task tracked by a [`TaskTracker`]:
//!
//! 1. wait for the admission signal (or shutdown),
//! 2. mark the repository `scanning` and ask the worker to start,
//! 3. poll the worker every `poll_interval` until it reports a terminal
//!    status,
//! 4. persist the outcome and hand the slot back to the admission controller.
//!
//! Steps 2 and 3 race the shutdown token and a deadline taken at admission.
//! Step 4 always runs, whatever happened before it, so capacity is never
//! leaked by a failed scan.

use std::sync::Arc;
use std::time::Duration;

use autodoc_core::admission::{
    AdmissionController, Enqueued, JobId, JobOutcome, JobStatus, QueueStats, ScanJob,
};
use autodoc_core::scanning::{
    ScanStatus, ACTIVITY_SCAN_COMPLETED, ACTIVITY_SCAN_FAILED, ACTIVITY_SCAN_STARTED,
    DEFAULT_BRANCH, DEFAULT_POLL_INTERVAL, DEFAULT_SCAN_TIMEOUT,
};
use autodoc_core::types::{DbId, Timestamp};
use autodoc_db::models::activity::CreateActivity;
use autodoc_db::models::repository::{Repository, UpdateRepository};
use autodoc_db::store::{Store, StoreResult};
use autodoc_scanner::{DetectedEndpoint, ScanningWorker, WorkerStatus};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{OrchestratorError, ScanFailure, ORPHANED_SCAN_REASON};
use crate::mapping::to_create_endpoints;

/// Fallback message when the worker fails a scan without saying why.
const UNSPECIFIED_WORKER_FAILURE: &str = "scan failed on worker";

/// Timing and defaults for a [`ScanOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub scan_timeout: Duration,
    /// Branch used when a repository has none recorded.
    pub default_branch: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

/// Immediate answer to a scan request. The scan itself runs in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanAccepted {
    pub job_id: JobId,
    pub repository_id: DbId,
    /// `processing` if admitted right away, otherwise `queued`.
    pub status: JobStatus,
}

/// Persisted scan state of a repository plus its live admission job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanStatusView {
    pub repository_id: DbId,
    pub status: ScanStatus,
    pub error_message: Option<String>,
    pub endpoint_count: i32,
    pub last_scanned_at: Option<Timestamp>,
    pub active_job: Option<ScanJob>,
}

/// Drives repository scans from request to terminal state.
///
/// Clones share the same controller, worker, store and task set.
#[derive(Clone)]
pub struct ScanOrchestrator {
    store: Arc<dyn Store>,
    worker: Arc<dyn ScanningWorker>,
    admission: Arc<AdmissionController>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        worker: Arc<dyn ScanningWorker>,
        admission: Arc<AdmissionController>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            worker,
            admission,
            config,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Accept a scan of `repository_id` on behalf of `tenant_id`.
    ///
    /// Returns as soon as the job is registered. Fails if the repository is
    /// unknown to the tenant, already has a queued or processing scan, or the
    /// orchestrator is shutting down.
    pub async fn request_scan(
        &self,
        repository_id: DbId,
        tenant_id: DbId,
    ) -> Result<ScanAccepted, OrchestratorError> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let repo = self
            .store
            .find_repository(repository_id)
            .await?
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or(OrchestratorError::RepositoryNotFound(repository_id))?;

        let Enqueued { job, signal } = self.admission.enqueue_exclusive(repository_id, tenant_id)?;

        if let Err(e) = self.reset_to_pending(repository_id).await {
            // Give the slot back; the caller sees the storage error.
            if let Err(release) = self
                .admission
                .complete(job.id, JobOutcome::Failed(e.to_string()))
            {
                tracing::error!(job_id = %job.id, error = %release, "Failed to release scan job");
            }
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job.id,
            repository_id = %repository_id,
            tenant_id = %tenant_id,
            status = %job.status,
            "Scan requested",
        );

        let accepted = ScanAccepted {
            job_id: job.id,
            repository_id,
            status: job.status,
        };

        let this = self.clone();
        self.tracker.spawn(async move {
            // Shutdown wins over a promotion that lands at the same time.
            let granted = tokio::select! {
                biased;
                _ = this.cancel.cancelled() => false,
                granted = signal.granted() => granted,
            };
            let outcome = if granted {
                // The deadline covers the whole processing window, worker
                // start included.
                let deadline = Instant::now() + this.config.scan_timeout;
                tokio::select! {
                    biased;
                    _ = this.cancel.cancelled() => Err(ScanFailure::Interrupted),
                    run = tokio::time::timeout_at(deadline, this.execute(&repo)) => {
                        run.unwrap_or(Err(ScanFailure::Timeout))
                    }
                }
            } else {
                Err(ScanFailure::Interrupted)
            };
            this.finish(&job, &repo, outcome).await;
        });

        Ok(accepted)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.admission.stats()
    }

    /// Scan state of a repository. With `tenant_id`, repositories owned by
    /// other tenants read as not found.
    pub async fn scan_status(
        &self,
        repository_id: DbId,
        tenant_id: Option<DbId>,
    ) -> Result<ScanStatusView, OrchestratorError> {
        let repo = self
            .store
            .find_repository(repository_id)
            .await?
            .filter(|r| tenant_id.map_or(true, |t| r.tenant_id == t))
            .ok_or(OrchestratorError::RepositoryNotFound(repository_id))?;

        Ok(ScanStatusView {
            repository_id,
            status: repo.scan_status(),
            error_message: repo.scan_error_message,
            endpoint_count: repo.endpoint_count,
            last_scanned_at: repo.last_scanned_at,
            active_job: self.admission.active_job(repository_id),
        })
    }

    /// Stop accepting scans, interrupt running ones and withdraw queued ones,
    /// then wait up to `timeout` for every scan task to record its outcome.
    ///
    /// Returns `false` if the wait timed out.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();

        let pending = self.tracker.len();
        tracing::info!(pending, "Scan orchestrator shutting down");

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("Scan orchestrator stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.tracker.len(),
                    timeout_secs = timeout.as_secs(),
                    "Scan orchestrator shutdown timed out",
                );
                false
            }
        }
    }

    // ---- scan task ----

    /// Run an admitted scan. Returns the number of endpoints stored.
    ///
    /// The caller bounds this with the scan deadline and the shutdown token.
    async fn execute(&self, repo: &Repository) -> Result<usize, ScanFailure> {
        self.transition(
            repo.id,
            ScanStatus::Scanning,
            UpdateRepository {
                scan_error_message: Some(None),
                ..Default::default()
            },
        )
        .await;
        self.record_activity(
            repo,
            ACTIVITY_SCAN_STARTED,
            format!("Scan started for {}", repo.full_name),
            None,
            json!({}),
        )
        .await;

        let branch = if repo.default_branch.trim().is_empty() {
            self.config.default_branch.as_str()
        } else {
            repo.default_branch.as_str()
        };

        let scan_id = self
            .worker
            .start(&repo.repo_url, branch)
            .await
            .map_err(|e| ScanFailure::WorkerUnreachable(e.to_string()))?;

        tracing::info!(
            repository_id = %repo.id,
            worker_scan_id = %scan_id,
            branch,
            "Scanning worker started",
        );

        let detected = self.poll_until_done(repo.id, &scan_id).await?;

        let endpoints = to_create_endpoints(detected);
        let stored = self
            .store
            .replace_endpoints(repo.id, &endpoints)
            .await
            .map_err(|e| ScanFailure::StorageUnavailable(e.to_string()))?;
        Ok(stored.len())
    }

    /// Poll the worker until it reports a terminal status. Transient errors
    /// are logged and retried on the next tick; only the caller's deadline
    /// stops a scan that never finishes.
    async fn poll_until_done(
        &self,
        repository_id: DbId,
        scan_id: &str,
    ) -> Result<Vec<DetectedEndpoint>, ScanFailure> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        // A slow status call must not be followed by a burst of catch-up polls.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the worker was only just started.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match self.worker.status(scan_id).await {
                Ok(WorkerStatus::Started) => {
                    tracing::debug!(
                        repository_id = %repository_id,
                        worker_scan_id = %scan_id,
                        "Scan still running",
                    );
                }
                Ok(WorkerStatus::Completed) => match self.worker.results(scan_id).await {
                    Ok(detected) => return Ok(detected),
                    Err(e) => {
                        tracing::warn!(
                            repository_id = %repository_id,
                            worker_scan_id = %scan_id,
                            error = %e,
                            "Failed to fetch scan results, retrying",
                        );
                    }
                },
                Ok(WorkerStatus::Failed(reason)) => {
                    return Err(ScanFailure::WorkerReportedFailure(
                        reason.unwrap_or_else(|| UNSPECIFIED_WORKER_FAILURE.to_string()),
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        repository_id = %repository_id,
                        worker_scan_id = %scan_id,
                        error = %e,
                        "Scan status poll failed, retrying",
                    );
                }
            }
        }
    }

    /// Record the terminal outcome and release the admission slot.
    async fn finish(&self, job: &ScanJob, repo: &Repository, outcome: Result<usize, ScanFailure>) {
        let admission_outcome = match outcome {
            Ok(endpoint_count) => {
                self.transition(
                    repo.id,
                    ScanStatus::Completed,
                    UpdateRepository {
                        scan_error_message: Some(None),
                        endpoint_count: Some(i32::try_from(endpoint_count).unwrap_or(i32::MAX)),
                        last_scanned_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
                self.record_activity(
                    repo,
                    ACTIVITY_SCAN_COMPLETED,
                    format!("Scan completed for {}", repo.full_name),
                    Some(format!("Detected {endpoint_count} endpoints")),
                    json!({ "endpointCount": endpoint_count }),
                )
                .await;

                tracing::info!(
                    job_id = %job.id,
                    repository_id = %repo.id,
                    endpoint_count,
                    "Scan completed",
                );
                JobOutcome::Succeeded
            }
            Err(failure) => {
                let reason = failure.to_string();
                self.transition(
                    repo.id,
                    ScanStatus::Failed,
                    UpdateRepository {
                        scan_error_message: Some(Some(reason.clone())),
                        ..Default::default()
                    },
                )
                .await;
                self.record_activity(
                    repo,
                    ACTIVITY_SCAN_FAILED,
                    format!("Scan failed for {}", repo.full_name),
                    Some(reason.clone()),
                    json!({ "error": reason, "kind": failure.kind() }),
                )
                .await;

                tracing::warn!(
                    job_id = %job.id,
                    repository_id = %repo.id,
                    kind = failure.kind(),
                    reason = %reason,
                    "Scan failed",
                );
                JobOutcome::Failed(reason)
            }
        };

        if let Err(e) = self.admission.complete(job.id, admission_outcome) {
            tracing::error!(job_id = %job.id, error = %e, "Failed to release scan job");
        }
    }

    // ---- persistence helpers ----

    /// Put a repository back to `pending` ahead of a new scan.
    ///
    /// Must run after admission: the row is re-read so a scan that finished
    /// in the meantime is seen as such. A row still marked `scanning` then
    /// has no live job (the caller holds the repository's only admission
    /// slot), so it is failed first.
    async fn reset_to_pending(&self, repository_id: DbId) -> StoreResult<()> {
        let Some(repo) = self.store.find_repository(repository_id).await? else {
            return Ok(());
        };
        let mut current = repo.scan_status();
        if current == ScanStatus::Scanning {
            tracing::warn!(
                repository_id = %repository_id,
                "Repository left in scanning state without a live job, failing it",
            );
            self.store
                .update_repository(
                    repository_id,
                    &UpdateRepository {
                        scan_status_id: Some(ScanStatus::Failed.id()),
                        scan_error_message: Some(Some(ORPHANED_SCAN_REASON.to_string())),
                        ..Default::default()
                    },
                )
                .await?;
            current = ScanStatus::Failed;
        }
        if current.can_transition_to(ScanStatus::Pending) {
            self.store
                .update_repository(repository_id, &UpdateRepository::status(ScanStatus::Pending))
                .await?;
        }
        Ok(())
    }

    /// Best-effort move of a repository to `to`, applying `update` with it.
    ///
    /// Moves the status machine forbids are logged and skipped. Storage
    /// failures are logged, never propagated, so a storage outage cannot
    /// strand a job in `processing`.
    async fn transition(&self, repository_id: DbId, to: ScanStatus, mut update: UpdateRepository) {
        let current = match self.store.find_repository(repository_id).await {
            Ok(Some(repo)) => repo.scan_status(),
            Ok(None) => {
                tracing::warn!(repository_id = %repository_id, "Repository vanished during scan");
                return;
            }
            Err(e) => {
                tracing::error!(
                    repository_id = %repository_id,
                    error = %e,
                    "Failed to load repository scan state",
                );
                return;
            }
        };
        if !current.can_transition_to(to) {
            tracing::warn!(
                repository_id = %repository_id,
                from = %current,
                to = %to,
                "Skipping illegal scan status transition",
            );
            return;
        }

        update.scan_status_id = Some(to.id());
        match self.store.update_repository(repository_id, &update).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(repository_id = %repository_id, "Repository vanished during scan");
            }
            Err(e) => {
                tracing::error!(
                    repository_id = %repository_id,
                    error = %e,
                    "Failed to update repository scan state",
                );
            }
        }
    }

    async fn record_activity(
        &self,
        repo: &Repository,
        activity_type: &str,
        title: String,
        description: Option<String>,
        metadata: serde_json::Value,
    ) {
        let input = CreateActivity {
            activity_type: activity_type.to_string(),
            title,
            description,
            repository_id: repo.id,
            tenant_id: repo.tenant_id,
            metadata,
        };
        if let Err(e) = self.store.create_activity(&input).await {
            tracing::error!(
                repository_id = %repo.id,
                activity_type,
                error = %e,
                "Failed to record scan activity",
            );
        }
    }
}
