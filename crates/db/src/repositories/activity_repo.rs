//! Repository for the append-only `activities` table.

use autodoc_core::types::DbId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::activity::{Activity, CreateActivity};

const COLUMNS: &str =
    "id, activity_type, title, description, repository_id, tenant_id, metadata, created_at";

/// Maximum page size for tenant activity feeds.
const MAX_LIMIT: i64 = 100;

pub struct ActivityRepo;

impl ActivityRepo {
    pub async fn create(pool: &PgPool, input: &CreateActivity) -> Result<Activity, sqlx::Error> {
        let query = format!(
            "INSERT INTO activities (id, activity_type, title, description, repository_id, tenant_id, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Activity>(&query)
            .bind(Uuid::now_v7())
            .bind(&input.activity_type)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.repository_id)
            .bind(input.tenant_id)
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }

    /// All activities for a repository, oldest first.
    pub async fn list_by_repository(
        pool: &PgPool,
        repository_id: DbId,
    ) -> Result<Vec<Activity>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM activities WHERE repository_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, Activity>(&query)
            .bind(repository_id)
            .fetch_all(pool)
            .await
    }

    /// Latest activities for a tenant, newest first. `limit` is capped at 100.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: DbId,
        limit: i64,
    ) -> Result<Vec<Activity>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM activities WHERE tenant_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, Activity>(&query)
            .bind(tenant_id)
            .bind(limit.clamp(1, MAX_LIMIT))
            .fetch_all(pool)
            .await
    }
}
