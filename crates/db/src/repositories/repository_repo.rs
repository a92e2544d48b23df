//! Repository for the `repositories` table.

use autodoc_core::scanning::ScanStatus;
use autodoc_core::types::DbId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::repository::{CreateRepository, Repository, UpdateRepository};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, tenant_id, name, full_name, repo_url, default_branch, \
    scan_status_id, scan_error_message, endpoint_count, last_scanned_at, \
    created_at, updated_at";

/// Provides CRUD operations for connected source repositories.
pub struct RepositoryRepo;

impl RepositoryRepo {
    /// Insert a new repository in `pending` scan status.
    pub async fn create(pool: &PgPool, input: &CreateRepository) -> Result<Repository, sqlx::Error> {
        let query = format!(
            "INSERT INTO repositories (id, tenant_id, name, full_name, repo_url, default_branch, scan_status_id)
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'main'), $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Repository>(&query)
            .bind(Uuid::now_v7())
            .bind(input.tenant_id)
            .bind(&input.name)
            .bind(&input.full_name)
            .bind(&input.repo_url)
            .bind(&input.default_branch)
            .bind(ScanStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Repository>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM repositories WHERE id = $1");
        sqlx::query_as::<_, Repository>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's repositories, most recently created first.
    pub async fn list_by_tenant(pool: &PgPool, tenant_id: DbId) -> Result<Vec<Repository>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM repositories WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Repository>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Update a repository. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateRepository,
    ) -> Result<Option<Repository>, sqlx::Error> {
        let query = format!(
            "UPDATE repositories SET
                name = COALESCE($2, name),
                repo_url = COALESCE($3, repo_url),
                default_branch = COALESCE($4, default_branch),
                scan_status_id = COALESCE($5, scan_status_id),
                scan_error_message = CASE WHEN $6 THEN $7 ELSE scan_error_message END,
                endpoint_count = COALESCE($8, endpoint_count),
                last_scanned_at = COALESCE($9, last_scanned_at),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Repository>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.repo_url)
            .bind(&input.default_branch)
            .bind(input.scan_status_id)
            .bind(input.scan_error_message.is_some())
            .bind(input.scan_error_message.clone().flatten())
            .bind(input.endpoint_count)
            .bind(input.last_scanned_at)
            .fetch_optional(pool)
            .await
    }

    /// Permanently delete a repository. Endpoints and activities cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
