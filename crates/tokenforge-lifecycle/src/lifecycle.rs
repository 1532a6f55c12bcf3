//! The deployment state machine.

use chrono::Utc;
use std::sync::Arc;
use tokenforge_core::deployment::{
    Deployment, DeploymentFilter, DeploymentStatus, NewDeployment, PageRequest, StatusDetails,
    StatusEntry, TransitionOutcome,
};
use tokenforge_core::lock::KeyedLocks;
use tokenforge_core::webhook::EventPublisher;
use tokenforge_core::{DeploymentId, Error, Result};
use tokenforge_db::{DbError, DeploymentStore};
use tracing::{debug, info, warn};

use crate::events;

/// Validates and applies status transitions for token deployments.
///
/// Transitions for one deployment id are serialized through a per-id lock and
/// committed with a compare-and-swap on the current status, so two racing
/// requests can never both act on the same pre-state.
pub struct DeploymentLifecycle {
    store: Arc<dyn DeploymentStore>,
    publisher: Arc<dyn EventPublisher>,
    locks: KeyedLocks<DeploymentId>,
}

impl DeploymentLifecycle {
    pub fn new(store: Arc<dyn DeploymentStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            locks: KeyedLocks::new(),
        }
    }

    /// Register a new deployment in `Queued` and announce it.
    pub async fn create_deployment(&self, input: NewDeployment) -> Result<DeploymentId> {
        let now = Utc::now();
        let deployment = Deployment::queued(input, now);
        let id = deployment.id.clone();
        let initial =
            StatusDetails::default().into_entry(id.clone(), DeploymentStatus::Queued, now);

        let created = {
            let _guard = self.locks.lock(&id).await;
            self.store
                .create(deployment, initial)
                .await
                .map_err(|e| match e {
                    DbError::Duplicate(_) => {
                        Error::Conflict(format!("deployment {} already exists", id))
                    }
                    other => other.into(),
                })?
        };

        info!(
            deployment_id = %id,
            network = %created.network,
            token_type = %created.token_type,
            "Deployment queued"
        );

        self.publisher
            .publish(events::deployment_started(&created))
            .await;

        Ok(id)
    }

    pub async fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>> {
        Ok(self.store.get_by_id(id).await?)
    }

    /// Full status history, oldest first. Empty for unknown ids.
    pub async fn get_status_history(&self, id: &DeploymentId) -> Result<Vec<StatusEntry>> {
        Ok(self.store.get_history(id).await?)
    }

    /// Move a deployment to `new_status`, recording `message` in its history.
    pub async fn update_status(
        &self,
        id: &DeploymentId,
        new_status: DeploymentStatus,
        message: Option<String>,
    ) -> Result<TransitionOutcome> {
        let details = StatusDetails {
            message,
            ..Default::default()
        };
        self.apply_transition(id, new_status, details).await
    }

    /// Move a deployment to `Failed`, recording the error and whether a retry makes sense.
    pub async fn mark_failed(
        &self,
        id: &DeploymentId,
        error_message: impl Into<String>,
        is_retryable: bool,
    ) -> Result<TransitionOutcome> {
        self.apply_transition(
            id,
            DeploymentStatus::Failed,
            StatusDetails::failure(error_message, is_retryable),
        )
        .await
    }

    /// General transition entry point.
    ///
    /// Business outcomes (missing deployment, idempotent repeat, illegal edge)
    /// come back as a [`TransitionOutcome`]; only storage failures are errors.
    pub async fn apply_transition(
        &self,
        id: &DeploymentId,
        new_status: DeploymentStatus,
        details: StatusDetails,
    ) -> Result<TransitionOutcome> {
        let (updated, previous, entry) = {
            let _guard = self.locks.lock(id).await;

            let Some(current) = self.store.get_by_id(id).await? else {
                debug!(deployment_id = %id, "Transition requested for unknown deployment");
                return Ok(TransitionOutcome::NotFound);
            };
            let from = current.current_status;

            if from == new_status {
                debug!(deployment_id = %id, status = %from, "Status unchanged, ignoring repeat");
                return Ok(TransitionOutcome::Unchanged(from));
            }

            if !from.can_transition_to(new_status) {
                warn!(
                    deployment_id = %id,
                    from = %from,
                    to = %new_status,
                    "Rejected illegal status transition"
                );
                return Ok(TransitionOutcome::Rejected {
                    from,
                    to: new_status,
                });
            }

            // History must never go backwards, even if the wall clock does.
            let timestamp = Utc::now().max(current.updated_at);
            let entry = details.into_entry(id.clone(), new_status, timestamp);

            let updated = self
                .store
                .commit_transition(id, from, entry.clone())
                .await
                .inspect_err(|e| {
                    warn!(deployment_id = %id, error = %e, "Failed to commit status transition")
                })?;
            (updated, from, entry)
        };

        info!(
            deployment_id = %id,
            from = %previous,
            to = %new_status,
            "Deployment status updated"
        );

        if let Some(event) = events::for_transition(&updated, previous, &entry) {
            self.publisher.publish(event).await;
        }

        Ok(TransitionOutcome::Applied {
            from: previous,
            to: new_status,
        })
    }

    /// Record the on-chain asset/contract identifier. Leaves status and history alone.
    ///
    /// Returns `false` if the deployment does not exist.
    pub async fn update_asset_identifier(
        &self,
        id: &DeploymentId,
        identifier: impl Into<String>,
    ) -> Result<bool> {
        let identifier = identifier.into();
        let _guard = self.locks.lock(id).await;

        let Some(mut deployment) = self.store.get_by_id(id).await? else {
            return Ok(false);
        };

        deployment.asset_identifier = Some(identifier);
        deployment.updated_at = Utc::now().max(deployment.updated_at);
        self.store.update(deployment).await?;

        info!(deployment_id = %id, "Asset identifier recorded");
        Ok(true)
    }

    pub async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Deployment>> {
        Ok(self
            .store
            .list(&filter.normalized(), PageRequest::new(page, page_size))
            .await?)
    }

    pub async fn count_deployments(&self, filter: &DeploymentFilter) -> Result<u64> {
        Ok(self.store.count(&filter.normalized()).await?)
    }
}
