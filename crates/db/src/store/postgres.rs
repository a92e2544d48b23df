//! Postgres-backed [`Store`].

use async_trait::async_trait;
use autodoc_core::types::DbId;

use crate::models::activity::{Activity, CreateActivity};
use crate::models::endpoint::{CreateEndpoint, Endpoint, UpdateEndpoint};
use crate::models::repository::{CreateRepository, Repository, UpdateRepository};
use crate::repositories::{ActivityRepo, EndpointRepo, RepositoryRepo};
use crate::DbPool;

use super::{Store, StoreBackend, StoreResult};

/// Durable storage delegating to the `*Repo` query layer.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgres
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }

    async fn find_repository(&self, id: DbId) -> StoreResult<Option<Repository>> {
        Ok(RepositoryRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_repositories(&self, tenant_id: DbId) -> StoreResult<Vec<Repository>> {
        Ok(RepositoryRepo::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn create_repository(&self, input: &CreateRepository) -> StoreResult<Repository> {
        Ok(RepositoryRepo::create(&self.pool, input).await?)
    }

    async fn update_repository(
        &self,
        id: DbId,
        input: &UpdateRepository,
    ) -> StoreResult<Option<Repository>> {
        Ok(RepositoryRepo::update(&self.pool, id, input).await?)
    }

    async fn delete_repository(&self, id: DbId) -> StoreResult<bool> {
        Ok(RepositoryRepo::delete(&self.pool, id).await?)
    }

    async fn find_endpoint(&self, id: DbId) -> StoreResult<Option<Endpoint>> {
        Ok(EndpointRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_endpoints(&self, repository_id: DbId) -> StoreResult<Vec<Endpoint>> {
        Ok(EndpointRepo::list_by_repository(&self.pool, repository_id).await?)
    }

    async fn create_endpoint(
        &self,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> StoreResult<Endpoint> {
        Ok(EndpointRepo::create(&self.pool, repository_id, input).await?)
    }

    async fn update_endpoint(
        &self,
        id: DbId,
        input: &UpdateEndpoint,
    ) -> StoreResult<Option<Endpoint>> {
        Ok(EndpointRepo::update(&self.pool, id, input).await?)
    }

    async fn delete_endpoints(&self, repository_id: DbId) -> StoreResult<u64> {
        Ok(EndpointRepo::delete_by_repository(&self.pool, repository_id).await?)
    }

    async fn replace_endpoints(
        &self,
        repository_id: DbId,
        endpoints: &[CreateEndpoint],
    ) -> StoreResult<Vec<Endpoint>> {
        Ok(EndpointRepo::replace_for_repository(&self.pool, repository_id, endpoints).await?)
    }

    async fn list_activities(&self, repository_id: DbId) -> StoreResult<Vec<Activity>> {
        Ok(ActivityRepo::list_by_repository(&self.pool, repository_id).await?)
    }

    async fn list_tenant_activities(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<Activity>> {
        Ok(ActivityRepo::list_by_tenant(&self.pool, tenant_id, limit).await?)
    }

    async fn create_activity(&self, input: &CreateActivity) -> StoreResult<Activity> {
        Ok(ActivityRepo::create(&self.pool, input).await?)
    }
}
