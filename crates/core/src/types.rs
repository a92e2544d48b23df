/// All primary keys are UUIDs (v7 for new rows, so they sort by creation time).
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
