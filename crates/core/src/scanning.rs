//! Repository scan lifecycle constants and state machine.
//!
//! Lives in `core` so the storage layer, the orchestrator and the API agree
//! on status IDs, timing defaults and activity names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timing and branch defaults
// ---------------------------------------------------------------------------

/// How often the orchestrator asks the scanning worker for job status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Wall-clock bound on a single scan, measured from worker start.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Branch scanned when the repository does not name one.
pub const DEFAULT_BRANCH: &str = "main";

/// Failure reason recorded when a scan exceeds [`DEFAULT_SCAN_TIMEOUT`].
pub const TIMEOUT_REASON: &str = "timeout exceeded";

// ---------------------------------------------------------------------------
// Activity types
// ---------------------------------------------------------------------------

/// Activity emitted when a scan moves to `scanning`.
pub const ACTIVITY_SCAN_STARTED: &str = "scan_started";

/// Activity emitted when a scan finishes with endpoints stored.
pub const ACTIVITY_SCAN_COMPLETED: &str = "scan_completed";

/// Activity emitted for every failed scan (worker, timeout or shutdown).
pub const ACTIVITY_SCAN_FAILED: &str = "scan_failed";

// ---------------------------------------------------------------------------
// Repository scan status
// ---------------------------------------------------------------------------

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Persisted scan status of a repository.
///
/// Discriminants match the `scan_statuses` seed rows.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending = 1,
    Scanning = 2,
    Completed = 3,
    Failed = 4,
}

impl ScanStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Scanning),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` end a scan attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the orchestrator may move a repository from `self` to `to`.
    ///
    /// Terminal states may only re-enter `pending` (a rescan). `pending` may
    /// fail directly when a queued scan is withdrawn before it starts.
    pub fn can_transition_to(self, to: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, to),
            (Pending, Scanning)
                | (Pending, Failed)
                | (Scanning, Completed)
                | (Scanning, Failed)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }
}

impl From<ScanStatus> for StatusId {
    fn from(value: ScanStatus) -> Self {
        value as StatusId
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
