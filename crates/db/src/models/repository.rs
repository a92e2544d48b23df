//! Repository entity model and DTOs.

use autodoc_core::scanning::{ScanStatus, StatusId};
use autodoc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `repositories` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Repository {
    pub id: DbId,
    pub tenant_id: DbId,
    pub name: String,
    /// Canonical `owner/name` identifier.
    pub full_name: String,
    pub repo_url: String,
    pub default_branch: String,
    pub scan_status_id: StatusId,
    pub scan_error_message: Option<String>,
    pub endpoint_count: i32,
    pub last_scanned_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Repository {
    /// Typed view of `scan_status_id`. Unknown IDs read as `pending`.
    pub fn scan_status(&self) -> ScanStatus {
        ScanStatus::from_id(self.scan_status_id).unwrap_or(ScanStatus::Pending)
    }
}

/// DTO for registering a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRepository {
    pub tenant_id: DbId,
    pub name: String,
    pub full_name: String,
    pub repo_url: String,
    /// Defaults to `main` if omitted.
    pub default_branch: Option<String>,
}

/// Partial update for a repository. `None` leaves the column untouched.
///
/// `scan_error_message` is doubly optional so it can be cleared:
/// `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRepository {
    pub name: Option<String>,
    pub repo_url: Option<String>,
    pub default_branch: Option<String>,
    pub scan_status_id: Option<StatusId>,
    pub scan_error_message: Option<Option<String>>,
    pub endpoint_count: Option<i32>,
    pub last_scanned_at: Option<Timestamp>,
}

impl UpdateRepository {
    /// Update that only moves the scan status.
    pub fn status(status: ScanStatus) -> Self {
        Self {
            scan_status_id: Some(status.id()),
            ..Self::default()
        }
    }
}
