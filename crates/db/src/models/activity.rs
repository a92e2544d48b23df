//! Activity feed entries. Rows are append-only.

use autodoc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `activities` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Activity {
    pub id: DbId,
    /// e.g. `scan_started`, `scan_completed`, `scan_failed`.
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub repository_id: DbId,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for appending an activity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateActivity {
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub repository_id: DbId,
    pub tenant_id: DbId,
    pub metadata: serde_json::Value,
}
