//! Scan admission control.
//!
//! [`AdmissionController`] bounds how many scans run at once, globally and per
//! tenant. It owns every [`ScanJob`], the FIFO wait queue and the active-slot
//! counters behind one mutex. Both entry points that mutate that state
//! ([`enqueue`](AdmissionController::enqueue) and
//! [`complete`](AdmissionController::complete)) hold the lock only for plain
//! bookkeeping and never across an `.await`, so concurrent admission
//! decisions are serialized no matter how many scans are mid-poll.
//!
//! The controller never expires jobs on its own. Whoever drives a job is
//! responsible for calling `complete` exactly once it reaches a terminal
//! outcome, including timeouts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Maximum scans processing at once across all tenants.
pub const DEFAULT_MAX_GLOBAL: usize = 5;

/// Maximum scans processing at once for a single tenant.
pub const DEFAULT_MAX_PER_TENANT: usize = 2;

/// Number of terminal jobs kept for stats and lookups before eviction.
pub const DEFAULT_RETENTION_CAP: usize = 100;

/// Capacity limits for an [`AdmissionController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub max_global: usize,
    pub max_per_tenant: usize,
    pub retention_cap: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_global: DEFAULT_MAX_GLOBAL,
            max_per_tenant: DEFAULT_MAX_PER_TENANT,
            retention_cap: DEFAULT_RETENTION_CAP,
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Opaque scan job identifier, generated at enqueue time.
pub type JobId = uuid::Uuid;

/// Admission status of a scan job. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Queued or processing.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One unit of admission control. Snapshots are handed out by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanJob {
    pub id: JobId,
    pub repository_id: DbId,
    pub tenant_id: DbId,
    pub status: JobStatus,
    pub queued_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
}

/// Terminal outcome reported through [`AdmissionController::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

/// Resolves once the job has been promoted to `processing`.
///
/// Resolves to `false` if the job will never start, e.g. it was withdrawn
/// while still queued.
#[derive(Debug)]
pub struct AdmissionSignal(oneshot::Receiver<()>);

impl AdmissionSignal {
    pub async fn granted(self) -> bool {
        self.0.await.is_ok()
    }
}

/// Result of a successful enqueue.
#[derive(Debug)]
pub struct Enqueued {
    /// Job snapshot taken after the admission decision.
    pub job: ScanJob,
    pub signal: AdmissionSignal,
}

/// Result of a successful [`AdmissionController::complete`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub job: ScanJob,
    /// Whether the job held a slot that has now been freed.
    pub released_slot: bool,
    /// Jobs promoted to `processing` as a consequence, oldest first.
    pub promoted: Vec<JobId>,
}

/// Read-only snapshot of the controller for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub active_global: usize,
    pub max_global: usize,
    pub max_per_tenant: usize,
}

/// Rejected admission operations. None of these mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Scan job not found: {0}")]
    UnknownJob(JobId),

    #[error("Scan job {job_id} is already {status}")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },

    #[error("Scan job {0} is still queued and cannot complete successfully")]
    NotStarted(JobId),

    #[error("Repository {repository_id} already has active scan job {job_id}")]
    AlreadyActive { repository_id: DbId, job_id: JobId },
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Bounded concurrency queue for repository scans.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct AdmissionController {
    config: AdmissionConfig,
    state: Mutex<AdmissionState>,
}

#[derive(Debug, Default)]
struct AdmissionState {
    jobs: HashMap<JobId, ScanJob>,
    /// Waiting jobs in enqueue order.
    queue: VecDeque<JobId>,
    /// Terminal jobs in completion order, oldest first.
    history: VecDeque<JobId>,
    waiters: HashMap<JobId, oneshot::Sender<()>>,
    active_global: usize,
    active_per_tenant: HashMap<DbId, usize>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        let config = AdmissionConfig {
            max_global: config.max_global.max(1),
            max_per_tenant: config.max_per_tenant.max(1),
            retention_cap: config.retention_cap,
        };
        Self {
            config,
            state: Mutex::new(AdmissionState::default()),
        }
    }

    pub fn config(&self) -> AdmissionConfig {
        self.config
    }

    /// Register a scan request. Never fails.
    ///
    /// The job is promoted to `processing` within this call when both the
    /// global and the tenant have a free slot; otherwise it waits in the queue.
    pub fn enqueue(&self, repository_id: DbId, tenant_id: DbId) -> Enqueued {
        let mut state = self.lock();
        state.enqueue(&self.config, repository_id, tenant_id)
    }

    /// Like [`enqueue`](Self::enqueue), but rejects the request when the
    /// repository already has a queued or processing job. The check and the
    /// insert happen under the same lock.
    pub fn enqueue_exclusive(
        &self,
        repository_id: DbId,
        tenant_id: DbId,
    ) -> Result<Enqueued, AdmissionError> {
        let mut state = self.lock();
        if let Some(active) = state.active_job_for(repository_id) {
            return Err(AdmissionError::AlreadyActive {
                repository_id,
                job_id: active.id,
            });
        }
        Ok(state.enqueue(&self.config, repository_id, tenant_id))
    }

    /// Move a job to its terminal status and hand freed capacity to the
    /// oldest eligible queued jobs.
    ///
    /// Counters are only decremented for jobs that reached `processing`. A
    /// queued job may be withdrawn with [`JobOutcome::Failed`]; completing it
    /// successfully is rejected. A second call for the same job is rejected
    /// without side effects.
    pub fn complete(&self, job_id: JobId, outcome: JobOutcome) -> Result<Completion, AdmissionError> {
        let mut state = self.lock();
        state.complete(&self.config, job_id, outcome)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut stats = QueueStats {
            queued_count: 0,
            processing_count: 0,
            completed_count: 0,
            failed_count: 0,
            active_global: state.active_global,
            max_global: self.config.max_global,
            max_per_tenant: self.config.max_per_tenant,
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => stats.queued_count += 1,
                JobStatus::Processing => stats.processing_count += 1,
                JobStatus::Completed => stats.completed_count += 1,
                JobStatus::Failed => stats.failed_count += 1,
            }
        }
        stats
    }

    /// True if the repository has a job that is queued or processing.
    pub fn has_active_job(&self, repository_id: DbId) -> bool {
        self.lock().active_job_for(repository_id).is_some()
    }

    /// Snapshot of the repository's queued or processing job, if any.
    pub fn active_job(&self, repository_id: DbId) -> Option<ScanJob> {
        self.lock().active_job_for(repository_id).cloned()
    }

    /// Snapshot of a job, if it is active or still within retention.
    pub fn job(&self, job_id: JobId) -> Option<ScanJob> {
        self.lock().jobs.get(&job_id).cloned()
    }

    /// Processing jobs currently charged to a tenant.
    pub fn tenant_active(&self, tenant_id: DbId) -> usize {
        self.lock()
            .active_per_tenant
            .get(&tenant_id)
            .copied()
            .unwrap_or(0)
    }

    /// IDs of all jobs still waiting for a slot, oldest first.
    pub fn queued_job_ids(&self) -> Vec<JobId> {
        self.lock().queue.iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // The state is plain bookkeeping; a panic mid-update cannot leave a
        // half-written invariant worth refusing to read.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

impl AdmissionState {
    fn enqueue(&mut self, config: &AdmissionConfig, repository_id: DbId, tenant_id: DbId) -> Enqueued {
        let (tx, rx) = oneshot::channel();
        let job = ScanJob {
            id: JobId::now_v7(),
            repository_id,
            tenant_id,
            status: JobStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        };
        let job_id = job.id;

        self.jobs.insert(job_id, job);
        self.queue.push_back(job_id);
        self.waiters.insert(job_id, tx);
        self.promote_eligible(config);

        let job = self.jobs[&job_id].clone();
        tracing::debug!(
            job_id = %job_id,
            repository_id = %repository_id,
            tenant_id = %tenant_id,
            status = %job.status,
            active_global = self.active_global,
            "Scan job enqueued",
        );

        Enqueued {
            job,
            signal: AdmissionSignal(rx),
        }
    }

    fn complete(
        &mut self,
        config: &AdmissionConfig,
        job_id: JobId,
        outcome: JobOutcome,
    ) -> Result<Completion, AdmissionError> {
        let job = self
            .jobs
            .get(&job_id)
            .ok_or(AdmissionError::UnknownJob(job_id))?;
        let (status, tenant_id) = (job.status, job.tenant_id);

        let released_slot = match (status, &outcome) {
            (JobStatus::Completed | JobStatus::Failed, _) => {
                return Err(AdmissionError::AlreadyTerminal { job_id, status });
            }
            (JobStatus::Queued, JobOutcome::Succeeded) => {
                return Err(AdmissionError::NotStarted(job_id));
            }
            (JobStatus::Queued, JobOutcome::Failed(_)) => {
                self.queue.retain(|id| *id != job_id);
                // Dropping the sender resolves the signal to `false`.
                self.waiters.remove(&job_id);
                false
            }
            (JobStatus::Processing, _) => {
                self.active_global = self.active_global.saturating_sub(1);
                if let Some(count) = self.active_per_tenant.get_mut(&tenant_id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.active_per_tenant.remove(&tenant_id);
                    }
                }
                true
            }
        };

        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(AdmissionError::UnknownJob(job_id))?;
        job.completed_at = Some(Utc::now());
        match outcome {
            JobOutcome::Succeeded => job.status = JobStatus::Completed,
            JobOutcome::Failed(reason) => {
                job.status = JobStatus::Failed;
                job.error = Some(reason);
            }
        }
        let snapshot = job.clone();

        self.history.push_back(job_id);
        self.evict_history(config.retention_cap);

        let promoted = if released_slot {
            self.promote_eligible(config)
        } else {
            Vec::new()
        };

        tracing::debug!(
            job_id = %job_id,
            status = %snapshot.status,
            released_slot,
            promoted = promoted.len(),
            active_global = self.active_global,
            "Scan job completed",
        );

        Ok(Completion {
            job: snapshot,
            released_slot,
            promoted,
        })
    }

    /// Walk the queue oldest-first and start every job whose tenant and the
    /// global pool both have room. Jobs blocked only by their tenant's cap are
    /// skipped, not reordered.
    fn promote_eligible(&mut self, config: &AdmissionConfig) -> Vec<JobId> {
        let mut promoted = Vec::new();
        let mut idx = 0;

        while idx < self.queue.len() && self.active_global < config.max_global {
            let job_id = self.queue[idx];
            let Some(job) = self.jobs.get_mut(&job_id) else {
                self.queue.remove(idx);
                continue;
            };

            let tenant_active = self
                .active_per_tenant
                .get(&job.tenant_id)
                .copied()
                .unwrap_or(0);
            if tenant_active >= config.max_per_tenant {
                idx += 1;
                continue;
            }

            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            *self.active_per_tenant.entry(job.tenant_id).or_insert(0) += 1;
            self.active_global += 1;
            self.queue.remove(idx);

            if let Some(tx) = self.waiters.remove(&job_id) {
                if tx.send(()).is_err() {
                    tracing::warn!(job_id = %job_id, "Promoted scan job has no listener");
                }
            }
            promoted.push(job_id);
        }

        promoted
    }

    fn active_job_for(&self, repository_id: DbId) -> Option<&ScanJob> {
        self.jobs
            .values()
            .find(|job| job.repository_id == repository_id && job.status.is_active())
    }

    fn evict_history(&mut self, cap: usize) {
        while self.history.len() > cap {
            if let Some(oldest) = self.history.pop_front() {
                self.jobs.remove(&oldest);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
