//! Repository for the `endpoints` table.

use autodoc_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::endpoint::{CreateEndpoint, Endpoint, UpdateEndpoint};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, repository_id, path, method, summary, description, tags, \
    parameters, responses, auth_required, file_path, line_number, code_snippet, \
    created_at, updated_at";

/// Provides CRUD operations for discovered endpoints.
pub struct EndpointRepo;

impl EndpointRepo {
    pub async fn create(
        pool: &PgPool,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> Result<Endpoint, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let endpoint = Self::insert_inner(&mut tx, repository_id, input).await?;
        tx.commit().await?;
        Ok(endpoint)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Endpoint>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM endpoints WHERE id = $1");
        sqlx::query_as::<_, Endpoint>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a repository's endpoints ordered by path, then method.
    pub async fn list_by_repository(
        pool: &PgPool,
        repository_id: DbId,
    ) -> Result<Vec<Endpoint>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM endpoints WHERE repository_id = $1 ORDER BY path, method"
        );
        sqlx::query_as::<_, Endpoint>(&query)
            .bind(repository_id)
            .fetch_all(pool)
            .await
    }

    /// Update documentation fields. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateEndpoint,
    ) -> Result<Option<Endpoint>, sqlx::Error> {
        let query = format!(
            "UPDATE endpoints SET
                summary = COALESCE($2, summary),
                description = COALESCE($3, description),
                tags = COALESCE($4, tags),
                parameters = COALESCE($5, parameters),
                responses = COALESCE($6, responses),
                auth_required = COALESCE($7, auth_required),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Endpoint>(&query)
            .bind(id)
            .bind(&input.summary)
            .bind(&input.description)
            .bind(&input.tags)
            .bind(&input.parameters)
            .bind(&input.responses)
            .bind(input.auth_required)
            .fetch_optional(pool)
            .await
    }

    /// Delete every endpoint of a repository. Returns the number removed.
    pub async fn delete_by_repository(pool: &PgPool, repository_id: DbId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM endpoints WHERE repository_id = $1")
            .bind(repository_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Swap a repository's endpoint set for `endpoints` in one transaction.
    ///
    /// Concurrent readers see either the old set or the new one, never an
    /// empty gap between delete and insert.
    pub async fn replace_for_repository(
        pool: &PgPool,
        repository_id: DbId,
        endpoints: &[CreateEndpoint],
    ) -> Result<Vec<Endpoint>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM endpoints WHERE repository_id = $1")
            .bind(repository_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(endpoints.len());
        for input in endpoints {
            inserted.push(Self::insert_inner(&mut tx, repository_id, input).await?);
        }

        tx.commit().await?;
        inserted.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
        Ok(inserted)
    }

    async fn insert_inner(
        tx: &mut Transaction<'_, Postgres>,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> Result<Endpoint, sqlx::Error> {
        let query = format!(
            "INSERT INTO endpoints \
                (id, repository_id, path, method, summary, description, tags, \
                 parameters, responses, auth_required, file_path, line_number, code_snippet) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Endpoint>(&query)
            .bind(Uuid::now_v7())
            .bind(repository_id)
            .bind(&input.path)
            .bind(&input.method)
            .bind(&input.summary)
            .bind(&input.description)
            .bind(&input.tags)
            .bind(&input.parameters)
            .bind(&input.responses)
            .bind(input.auth_required)
            .bind(&input.file_path)
            .bind(input.line_number)
            .bind(&input.code_snippet)
            .fetch_one(&mut **tx)
            .await
    }
}
