//! In-process [`Store`] used when no database is configured.
//!
//! All tables live behind one `RwLock`, so every method observes a consistent
//! snapshot. Endpoint replacement builds the new set first and swaps it in
//! under a single write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use autodoc_core::scanning::ScanStatus;
use autodoc_core::types::DbId;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::activity::{Activity, CreateActivity};
use crate::models::endpoint::{CreateEndpoint, Endpoint, UpdateEndpoint};
use crate::models::repository::{CreateRepository, Repository, UpdateRepository};

use super::{Store, StoreBackend, StoreError, StoreResult};

/// Maximum page size for tenant activity feeds, matching the SQL layer.
const MAX_ACTIVITY_LIMIT: i64 = 100;

#[derive(Debug, Default)]
struct Tables {
    repositories: HashMap<DbId, Repository>,
    /// Endpoint sets keyed by repository, kept sorted by (path, method).
    endpoints: HashMap<DbId, Vec<Endpoint>>,
    /// Append-only, in insertion order.
    activities: Vec<Activity>,
}

/// Non-durable storage backed by in-memory maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn build_endpoint(repository_id: DbId, input: &CreateEndpoint) -> Endpoint {
    let now = Utc::now();
    Endpoint {
        id: Uuid::now_v7(),
        repository_id,
        path: input.path.clone(),
        method: input.method.clone(),
        summary: input.summary.clone(),
        description: input.description.clone(),
        tags: input.tags.clone(),
        parameters: input.parameters.clone(),
        responses: input.responses.clone(),
        auth_required: input.auth_required,
        file_path: input.file_path.clone(),
        line_number: input.line_number,
        code_snippet: input.code_snippet.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn sort_endpoints(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    // -- repositories ---------------------------------------------------------

    async fn find_repository(&self, id: DbId) -> StoreResult<Option<Repository>> {
        Ok(self.tables.read().await.repositories.get(&id).cloned())
    }

    async fn list_repositories(&self, tenant_id: DbId) -> StoreResult<Vec<Repository>> {
        let tables = self.tables.read().await;
        let mut repos: Vec<_> = tables
            .repositories
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        repos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(repos)
    }

    async fn create_repository(&self, input: &CreateRepository) -> StoreResult<Repository> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .repositories
            .values()
            .any(|r| r.tenant_id == input.tenant_id && r.full_name == input.full_name);
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "repository {} already exists for tenant",
                input.full_name
            )));
        }

        let now = Utc::now();
        let repo = Repository {
            id: Uuid::now_v7(),
            tenant_id: input.tenant_id,
            name: input.name.clone(),
            full_name: input.full_name.clone(),
            repo_url: input.repo_url.clone(),
            default_branch: input
                .default_branch
                .clone()
                .unwrap_or_else(|| autodoc_core::scanning::DEFAULT_BRANCH.to_string()),
            scan_status_id: ScanStatus::Pending.id(),
            scan_error_message: None,
            endpoint_count: 0,
            last_scanned_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.repositories.insert(repo.id, repo.clone());
        Ok(repo)
    }

    async fn update_repository(
        &self,
        id: DbId,
        input: &UpdateRepository,
    ) -> StoreResult<Option<Repository>> {
        let mut tables = self.tables.write().await;
        let Some(repo) = tables.repositories.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = &input.name {
            repo.name = name.clone();
        }
        if let Some(url) = &input.repo_url {
            repo.repo_url = url.clone();
        }
        if let Some(branch) = &input.default_branch {
            repo.default_branch = branch.clone();
        }
        if let Some(status_id) = input.scan_status_id {
            repo.scan_status_id = status_id;
        }
        if let Some(message) = &input.scan_error_message {
            repo.scan_error_message = message.clone();
        }
        if let Some(count) = input.endpoint_count {
            repo.endpoint_count = count;
        }
        if let Some(at) = input.last_scanned_at {
            repo.last_scanned_at = Some(at);
        }
        repo.updated_at = Utc::now();

        Ok(Some(repo.clone()))
    }

    async fn delete_repository(&self, id: DbId) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let removed = tables.repositories.remove(&id).is_some();
        if removed {
            tables.endpoints.remove(&id);
            tables.activities.retain(|a| a.repository_id != id);
        }
        Ok(removed)
    }

    // -- endpoints ------------------------------------------------------------

    async fn find_endpoint(&self, id: DbId) -> StoreResult<Option<Endpoint>> {
        let tables = self.tables.read().await;
        Ok(tables
            .endpoints
            .values()
            .flat_map(|set| set.iter())
            .find(|e| e.id == id)
            .cloned())
    }

    async fn list_endpoints(&self, repository_id: DbId) -> StoreResult<Vec<Endpoint>> {
        let tables = self.tables.read().await;
        Ok(tables
            .endpoints
            .get(&repository_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_endpoint(
        &self,
        repository_id: DbId,
        input: &CreateEndpoint,
    ) -> StoreResult<Endpoint> {
        let mut tables = self.tables.write().await;
        if !tables.repositories.contains_key(&repository_id) {
            return Err(StoreError::NotFound {
                entity: "repository",
                id: repository_id,
            });
        }

        let endpoint = build_endpoint(repository_id, input);
        let set = tables.endpoints.entry(repository_id).or_default();
        set.push(endpoint.clone());
        sort_endpoints(set);
        Ok(endpoint)
    }

    async fn update_endpoint(
        &self,
        id: DbId,
        input: &UpdateEndpoint,
    ) -> StoreResult<Option<Endpoint>> {
        let mut tables = self.tables.write().await;
        let Some(endpoint) = tables
            .endpoints
            .values_mut()
            .flat_map(|set| set.iter_mut())
            .find(|e| e.id == id)
        else {
            return Ok(None);
        };

        if let Some(summary) = &input.summary {
            endpoint.summary = summary.clone();
        }
        if let Some(description) = &input.description {
            endpoint.description = description.clone();
        }
        if let Some(tags) = &input.tags {
            endpoint.tags = tags.clone();
        }
        if let Some(parameters) = &input.parameters {
            endpoint.parameters = parameters.clone();
        }
        if let Some(responses) = &input.responses {
            endpoint.responses = responses.clone();
        }
        if let Some(auth_required) = input.auth_required {
            endpoint.auth_required = auth_required;
        }
        endpoint.updated_at = Utc::now();

        Ok(Some(endpoint.clone()))
    }

    async fn delete_endpoints(&self, repository_id: DbId) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .endpoints
            .remove(&repository_id)
            .map_or(0, |set| set.len() as u64))
    }

    async fn replace_endpoints(
        &self,
        repository_id: DbId,
        endpoints: &[CreateEndpoint],
    ) -> StoreResult<Vec<Endpoint>> {
        let mut staged: Vec<Endpoint> = endpoints
            .iter()
            .map(|input| build_endpoint(repository_id, input))
            .collect();
        sort_endpoints(&mut staged);

        let mut tables = self.tables.write().await;
        if !tables.repositories.contains_key(&repository_id) {
            return Err(StoreError::NotFound {
                entity: "repository",
                id: repository_id,
            });
        }
        tables.endpoints.insert(repository_id, staged.clone());
        Ok(staged)
    }

    // -- activities -----------------------------------------------------------

    async fn list_activities(&self, repository_id: DbId) -> StoreResult<Vec<Activity>> {
        let tables = self.tables.read().await;
        Ok(tables
            .activities
            .iter()
            .filter(|a| a.repository_id == repository_id)
            .cloned()
            .collect())
    }

    async fn list_tenant_activities(&self, tenant_id: DbId, limit: i64) -> StoreResult<Vec<Activity>> {
        let limit = limit.clamp(1, MAX_ACTIVITY_LIMIT) as usize;
        let tables = self.tables.read().await;
        Ok(tables
            .activities
            .iter()
            .rev()
            .filter(|a| a.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_activity(&self, input: &CreateActivity) -> StoreResult<Activity> {
        let mut tables = self.tables.write().await;
        if !tables.repositories.contains_key(&input.repository_id) {
            return Err(StoreError::NotFound {
                entity: "repository",
                id: input.repository_id,
            });
        }

        let activity = Activity {
            id: Uuid::now_v7(),
            activity_type: input.activity_type.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            repository_id: input.repository_id,
            tenant_id: input.tenant_id,
            metadata: input.metadata.clone(),
            created_at: Utc::now(),
        };
        tables.activities.push(activity.clone());
        Ok(activity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
