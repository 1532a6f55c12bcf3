//! Deployment store - deployment records and their status history.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokenforge_core::DeploymentId;
use tokenforge_core::deployment::{
    Deployment, DeploymentFilter, DeploymentStatus, PageRequest, StatusEntry,
};
use tokio::sync::RwLock;

use crate::{DbError, DbResult};

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment together with its first history entry.
    ///
    /// Fails with [`DbError::Duplicate`] if the id is taken; nothing is
    /// written in that case.
    async fn create(&self, deployment: Deployment, initial: StatusEntry)
    -> DbResult<Deployment>;
    /// Replace an existing deployment record.
    async fn update(&self, deployment: Deployment) -> DbResult<Deployment>;
    async fn get_by_id(&self, id: &DeploymentId) -> DbResult<Option<Deployment>>;
    /// Newest first, ties broken by id.
    async fn list(&self, filter: &DeploymentFilter, page: PageRequest)
    -> DbResult<Vec<Deployment>>;
    async fn count(&self, filter: &DeploymentFilter) -> DbResult<u64>;

    // History
    async fn append_status_entry(&self, entry: StatusEntry) -> DbResult<()>;
    /// Entries in insertion order. Empty for unknown ids.
    async fn get_history(&self, id: &DeploymentId) -> DbResult<Vec<StatusEntry>>;

    /// Append `entry` and move the deployment to `entry.status` in one step,
    /// provided its current status is still `expected`.
    ///
    /// Fails with [`DbError::Conflict`] when the status moved underneath the
    /// caller; nothing is written in that case.
    async fn commit_transition(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        entry: StatusEntry,
    ) -> DbResult<Deployment>;
}

#[derive(Debug, Default)]
struct DeploymentTables {
    deployments: HashMap<DeploymentId, Deployment>,
    history: HashMap<DeploymentId, Vec<StatusEntry>>,
}

/// Process-local implementation of [`DeploymentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDeploymentStore {
    tables: Arc<RwLock<DeploymentTables>>,
}

impl MemoryDeploymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryDeploymentStore {
    async fn create(&self, deployment: Deployment, initial: StatusEntry) -> DbResult<Deployment> {
        if initial.deployment_id != deployment.id {
            return Err(DbError::Backend(format!(
                "history entry for {} does not belong to deployment {}",
                initial.deployment_id, deployment.id
            )));
        }

        let mut tables = self.tables.write().await;
        if tables.deployments.contains_key(&deployment.id) {
            return Err(DbError::Duplicate(format!("deployment {}", deployment.id)));
        }
        tables.history.insert(deployment.id.clone(), vec![initial]);
        tables
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn update(&self, deployment: Deployment) -> DbResult<Deployment> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .deployments
            .get_mut(&deployment.id)
            .ok_or_else(|| DbError::NotFound(format!("deployment {}", deployment.id)))?;
        *slot = deployment.clone();
        Ok(deployment)
    }

    async fn get_by_id(&self, id: &DeploymentId) -> DbResult<Option<Deployment>> {
        let tables = self.tables.read().await;
        Ok(tables.deployments.get(id).cloned())
    }

    async fn list(
        &self,
        filter: &DeploymentFilter,
        page: PageRequest,
    ) -> DbResult<Vec<Deployment>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Deployment> = tables
            .deployments
            .values()
            .filter(|d| filter.matches(d))
            .collect();

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &DeploymentFilter) -> DbResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .deployments
            .values()
            .filter(|d| filter.matches(d))
            .count() as u64)
    }

    async fn append_status_entry(&self, entry: StatusEntry) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.deployments.contains_key(&entry.deployment_id) {
            return Err(DbError::NotFound(format!(
                "deployment {}",
                entry.deployment_id
            )));
        }
        tables
            .history
            .entry(entry.deployment_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn get_history(&self, id: &DeploymentId) -> DbResult<Vec<StatusEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.history.get(id).cloned().unwrap_or_default())
    }

    async fn commit_transition(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        entry: StatusEntry,
    ) -> DbResult<Deployment> {
        let mut tables = self.tables.write().await;
        let DeploymentTables {
            deployments,
            history,
        } = &mut *tables;

        let deployment = deployments
            .get_mut(id)
            .ok_or_else(|| DbError::NotFound(format!("deployment {}", id)))?;

        if deployment.current_status != expected {
            return Err(DbError::Conflict(format!(
                "deployment {} is {}, expected {}",
                id, deployment.current_status, expected
            )));
        }

        deployment.current_status = entry.status;
        deployment.updated_at = entry.timestamp;
        if let Some(hash) = &entry.transaction_hash {
            deployment.transaction_hash = Some(hash.clone());
        }
        let updated = deployment.clone();

        history.entry(id.clone()).or_default().push(entry);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tokenforge_core::deployment::NewDeployment;

    fn deployment(id: &str, network: &str) -> Deployment {
        Deployment::queued(
            NewDeployment::new("ARC3", network, "alice", "Token", "TKN").with_id(id),
            Utc::now(),
        )
    }

    async fn create(store: &MemoryDeploymentStore, deployment: Deployment) -> DbResult<Deployment> {
        let initial = entry(deployment.id.as_str(), DeploymentStatus::Queued);
        store.create(deployment, initial).await
    }

    fn entry(id: &str, status: DeploymentStatus) -> StatusEntry {
        StatusEntry {
            deployment_id: DeploymentId::from(id),
            status,
            timestamp: Utc::now(),
            message: status.default_message().to_string(),
            transaction_hash: None,
            confirmed_round: None,
            error_message: None,
            retryable: None,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = MemoryDeploymentStore::new();
        let original = create(&store, deployment("d-1", "algorand-mainnet")).await.unwrap();

        let result = create(&store, deployment("d-1", "ethereum-mainnet")).await;
        assert!(matches!(result, Err(DbError::Duplicate(_))));

        let id = DeploymentId::from("d-1");
        let stored = store.get_by_id(&id).await.unwrap();
        assert_eq!(stored, Some(original));
        assert_eq!(store.get_history(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_writes_initial_entry_with_the_record() {
        let store = MemoryDeploymentStore::new();
        create(&store, deployment("d-1", "algorand-mainnet")).await.unwrap();

        let history = store.get_history(&DeploymentId::from("d-1")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeploymentStatus::Queued);
    }

    #[tokio::test]
    async fn test_create_rejects_entry_for_another_deployment() {
        let store = MemoryDeploymentStore::new();
        let result = store
            .create(
                deployment("d-1", "algorand-mainnet"),
                entry("d-2", DeploymentStatus::Queued),
            )
            .await;
        assert!(matches!(result, Err(DbError::Backend(_))));
        assert!(store.get_by_id(&DeploymentId::from("d-1")).await.unwrap().is_none());
        assert!(store.get_history(&DeploymentId::from("d-2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_on_missing_ids_are_empty() {
        let store = MemoryDeploymentStore::new();
        let id = DeploymentId::from("nope");
        assert!(store.get_by_id(&id).await.unwrap().is_none());
        assert!(store.get_history(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_requires_existing_deployment() {
        let store = MemoryDeploymentStore::new();
        let result = store
            .append_status_entry(entry("ghost", DeploymentStatus::Queued))
            .await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order() {
        let store = MemoryDeploymentStore::new();
        create(&store, deployment("d-1", "algorand-mainnet")).await.unwrap();
        for status in [DeploymentStatus::Submitted, DeploymentStatus::Pending] {
            store.append_status_entry(entry("d-1", status)).await.unwrap();
        }

        let statuses: Vec<_> = store
            .get_history(&DeploymentId::from("d-1"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                DeploymentStatus::Queued,
                DeploymentStatus::Submitted,
                DeploymentStatus::Pending
            ]
        );
    }

    #[tokio::test]
    async fn test_commit_transition_checks_expected_status() {
        let store = MemoryDeploymentStore::new();
        create(&store, deployment("d-1", "algorand-mainnet")).await.unwrap();
        let id = DeploymentId::from("d-1");

        let mut submitted = entry("d-1", DeploymentStatus::Submitted);
        submitted.transaction_hash = Some("0xabc".to_string());
        let updated = store
            .commit_transition(&id, DeploymentStatus::Queued, submitted)
            .await
            .unwrap();
        assert_eq!(updated.current_status, DeploymentStatus::Submitted);
        assert_eq!(updated.transaction_hash.as_deref(), Some("0xabc"));

        // Stale expectation: nothing is written.
        let stale = store
            .commit_transition(
                &id,
                DeploymentStatus::Queued,
                entry("d-1", DeploymentStatus::Failed),
            )
            .await;
        assert!(matches!(stale, Err(DbError::Conflict(_))));
        assert_eq!(store.get_history(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates_newest_first() {
        let store = MemoryDeploymentStore::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut d = deployment(&format!("d-{}", i), "algorand-mainnet");
            d.created_at = base + Duration::seconds(i);
            create(&store, d).await.unwrap();
        }
        create(&store, deployment("other", "ethereum-mainnet")).await.unwrap();

        let filter = DeploymentFilter::default().network("algorand-mainnet");
        assert_eq!(store.count(&filter).await.unwrap(), 5);
        assert_eq!(store.count(&DeploymentFilter::default()).await.unwrap(), 6);

        let first = store.list(&filter, PageRequest::new(1, 2)).await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["d-4", "d-3"]);

        let last = store.list(&filter, PageRequest::new(3, 2)).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id.as_str(), "d-0");

        let beyond = store.list(&filter, PageRequest::new(4, 2)).await.unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_deployment_fails() {
        let store = MemoryDeploymentStore::new();
        let result = store.update(deployment("ghost", "algorand-mainnet")).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
