//! Endpoint entity model and DTOs.

use autodoc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `endpoints` table: one discovered API route.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Endpoint {
    pub id: DbId,
    pub repository_id: DbId,
    pub path: String,
    /// Upper-case HTTP method.
    pub method: String,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    pub parameters: serde_json::Value,
    pub responses: serde_json::Value,
    pub auth_required: bool,
    pub file_path: Option<String>,
    pub line_number: Option<i32>,
    /// Source excerpt kept for downstream documentation generation.
    pub code_snippet: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting an endpoint under a repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateEndpoint {
    pub path: String,
    pub method: String,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    pub parameters: serde_json::Value,
    pub responses: serde_json::Value,
    pub auth_required: bool,
    pub file_path: Option<String>,
    pub line_number: Option<i32>,
    pub code_snippet: Option<String>,
}

/// Partial update for an endpoint's documentation fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEndpoint {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub parameters: Option<serde_json::Value>,
    pub responses: Option<serde_json::Value>,
    pub auth_required: Option<bool>,
}
