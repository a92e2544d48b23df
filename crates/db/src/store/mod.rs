//! Storage gateway.
//!
//! [`Store`] is the single persistence contract the scan orchestrator
//! depends on. Two interchangeable backends implement it:
//!
//! - [`PgStore`]: durable Postgres storage through the `*Repo` layer.
//! - [`MemoryStore`]: in-process tables used when no database is configured.
//!
//! The backend is chosen once at startup by [`connect`]; call sites never
//! branch on which one is active.

use std::sync::Arc;

use async_trait::async_trait;
use autodoc_core::types::DbId;

use crate::models::activity::{Activity, CreateActivity};
use crate::models::endpoint::{CreateEndpoint, Endpoint, UpdateEndpoint};
use crate::models::repository::{CreateRepository, Repository, UpdateRepository};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a [`Store`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The durable backend is configured but cannot be reached.
    /// [`MemoryStore`] never returns this.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A referenced parent row does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other database failure (constraint violations, bad SQL, ...).
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            // PostgreSQL unique constraint violation: error code 23505
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db_err.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which backend a [`Store`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Uniform CRUD-plus-filter contract for repositories, endpoints and
/// activities.
///
/// Partial updates only touch the fields supplied. Mutations that target a
/// missing row return `Ok(None)` / `Ok(false)` rather than an error.
#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> StoreBackend;

    async fn health_check(&self) -> StoreResult<()>;

    // -- repositories ---------------------------------------------------------

    async fn find_repository(&self, id: DbId) -> StoreResult<Option<Repository>>;

    async fn list_repositories(&self, tenant_id: DbId) -> StoreResult<Vec<Repository>>;

    async fn create_repository(&self, input: &CreateRepository) -> StoreResult<Repository>;

    async fn update_repository(
        &self,
        id: DbId,
        input: &UpdateRepository,
    ) -> StoreResult<Option<Repository>>;

    /// Delete a repository together with its endpoints and activities.
    async fn delete_repository(&self, id: DbId) -> StoreResult<bool>;

    // -- endpoints ------------------------------------------------------------

    async fn find_endpoint(&self, id: DbId) -> StoreResult<Option<Endpoint>>;

    /// Endpoints of a repository ordered by path, then method.
    async fn list_endpoints(&self, repository_id: DbId) -> StoreResult<Vec<Endpoint>>;

    async fn create_endpoint(
        &self,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> StoreResult<Endpoint>;

    async fn update_endpoint(
        &self,
        id: DbId,
        input: &UpdateEndpoint,
    ) -> StoreResult<Option<Endpoint>>;

    async fn delete_endpoints(&self, repository_id: DbId) -> StoreResult<u64>;

    /// Replace a repository's whole endpoint set. Readers never observe a
    /// mix of old and new rows, nor an empty set in between.
    async fn replace_endpoints(
        &self,
        repository_id: DbId,
        endpoints: &[CreateEndpoint],
    ) -> StoreResult<Vec<Endpoint>>;

    // -- activities -----------------------------------------------------------

    /// Activities of a repository, oldest first.
    async fn list_activities(&self, repository_id: DbId) -> StoreResult<Vec<Activity>>;

    /// Latest activities of a tenant, newest first.
    async fn list_tenant_activities(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<Activity>>;

    async fn create_activity(&self, input: &CreateActivity) -> StoreResult<Activity>;
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Pick the storage backend once at startup.
///
/// With a database URL, connects, verifies and migrates Postgres. Without
/// one, falls back to an empty [`MemoryStore`].
pub async fn connect(database_url: Option<&str>) -> StoreResult<Arc<dyn Store>> {
    let Some(url) = database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory storage (data is not persisted)");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = crate::create_pool(url).await?;
    tracing::info!("Database connection pool created");

    crate::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    crate::run_migrations(&pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("migrations failed: {e}")))?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgStore::new(pool)))
}
