//! Caller-facing operations.
//!
//! Each method wraps one component call and reports the outcome through a
//! [`ServiceResponse`]. Rejected transitions and missing records come back
//! as unsuccessful responses rather than errors.

use serde::Serialize;
use tokenforge_core::audit::{BulkExportRequest, ExportResult};
use tokenforge_core::deployment::{
    Deployment, DeploymentFilter, DeploymentStatus, NewDeployment, StatusDetails, StatusEntry,
    TransitionOutcome,
};
use tokenforge_core::webhook::{
    CreateSubscriptionRequest, CreatedSubscription, DeliveryRecord, SubscriptionView,
    UpdateSubscriptionRequest, WebhookEvent,
};
use tokenforge_core::{DeploymentId, Error, ResourceId, Result};
use tracing::warn;

use crate::{ServiceError, ServiceResponse, TokenForge};

/// One page of deployments plus the total matching the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentPage {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub deployments: Vec<Deployment>,
}

fn transition_response(
    id: &DeploymentId,
    outcome: Result<TransitionOutcome>,
) -> ServiceResponse<TransitionOutcome> {
    match outcome {
        Ok(outcome @ (TransitionOutcome::Applied { .. } | TransitionOutcome::Unchanged(_))) => {
            ServiceResponse::ok(outcome)
        }
        Ok(TransitionOutcome::NotFound) => ServiceResponse::failed(ServiceError::NotFound(
            format!("deployment {} not found", id),
        )),
        Ok(TransitionOutcome::Rejected { from, to }) => {
            ServiceResponse::failed(Error::InvalidTransition { from, to }.into())
        }
        Err(e) => {
            warn!(deployment_id = %id, error = %e, "Status update failed");
            ServiceResponse::failed(e.into())
        }
    }
}

impl TokenForge {
    pub async fn create_deployment(&self, input: NewDeployment) -> ServiceResponse<DeploymentId> {
        self.lifecycle.create_deployment(input).await.into()
    }

    pub async fn get_deployment(&self, id: &DeploymentId) -> ServiceResponse<Deployment> {
        match self.lifecycle.get_deployment(id).await {
            Ok(Some(deployment)) => ServiceResponse::ok(deployment),
            Ok(None) => ServiceResponse::failed(ServiceError::NotFound(format!(
                "deployment {} not found",
                id
            ))),
            Err(e) => ServiceResponse::failed(e.into()),
        }
    }

    pub async fn update_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        message: Option<String>,
    ) -> ServiceResponse<TransitionOutcome> {
        transition_response(id, self.lifecycle.update_status(id, status, message).await)
    }

    pub async fn apply_transition(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        details: StatusDetails,
    ) -> ServiceResponse<TransitionOutcome> {
        transition_response(id, self.lifecycle.apply_transition(id, status, details).await)
    }

    pub async fn mark_failed(
        &self,
        id: &DeploymentId,
        error_message: &str,
        is_retryable: bool,
    ) -> ServiceResponse<TransitionOutcome> {
        transition_response(
            id,
            self.lifecycle
                .mark_failed(id, error_message, is_retryable)
                .await,
        )
    }

    pub async fn update_asset_identifier(
        &self,
        id: &DeploymentId,
        identifier: &str,
    ) -> ServiceResponse<()> {
        match self.lifecycle.update_asset_identifier(id, identifier).await {
            Ok(true) => ServiceResponse::ok(()),
            Ok(false) => ServiceResponse::failed(ServiceError::NotFound(format!(
                "deployment {} not found",
                id
            ))),
            Err(e) => ServiceResponse::failed(e.into()),
        }
    }

    pub async fn get_status_history(&self, id: &DeploymentId) -> ServiceResponse<Vec<StatusEntry>> {
        self.lifecycle.get_status_history(id).await.into()
    }

    /// A page of deployments. A zero `page_size` uses the configured default.
    pub async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
        page: u32,
        page_size: u32,
    ) -> ServiceResponse<DeploymentPage> {
        let page = page.max(1);
        let page_size = match page_size {
            0 => self.config.audit.default_page_size,
            n => n,
        };
        let result = async {
            let total_count = self.lifecycle.count_deployments(filter).await?;
            let deployments = self
                .lifecycle
                .list_deployments(filter, page, page_size)
                .await?;
            Ok::<_, Error>(DeploymentPage {
                page,
                page_size,
                total_count,
                deployments,
            })
        }
        .await;
        result.into()
    }

    pub async fn export_audit_json(&self, id: &DeploymentId) -> ServiceResponse<String> {
        self.exporter.export_json(id).await.into()
    }

    pub async fn export_audit_csv(&self, id: &DeploymentId) -> ServiceResponse<String> {
        self.exporter.export_csv(id).await.into()
    }

    pub async fn export_audit_bulk(
        &self,
        request: BulkExportRequest,
        idempotency_key: Option<&str>,
    ) -> ExportResult {
        self.exporter.export_bulk(request, idempotency_key).await
    }

    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
        owner: &str,
    ) -> ServiceResponse<CreatedSubscription> {
        self.dispatcher.create_subscription(request, owner).await.into()
    }

    pub async fn get_subscription(
        &self,
        id: ResourceId,
        owner: &str,
    ) -> ServiceResponse<SubscriptionView> {
        self.dispatcher.get_subscription(id, owner).await.into()
    }

    pub async fn list_subscriptions(&self, owner: &str) -> ServiceResponse<Vec<SubscriptionView>> {
        self.dispatcher.list_subscriptions(owner).await.into()
    }

    pub async fn update_subscription(
        &self,
        id: ResourceId,
        request: UpdateSubscriptionRequest,
        owner: &str,
    ) -> ServiceResponse<SubscriptionView> {
        self.dispatcher
            .update_subscription(id, request, owner)
            .await
            .into()
    }

    pub async fn delete_subscription(&self, id: ResourceId, owner: &str) -> ServiceResponse<()> {
        self.dispatcher.delete_subscription(id, owner).await.into()
    }

    pub async fn rotate_signing_secret(
        &self,
        id: ResourceId,
        owner: &str,
    ) -> ServiceResponse<CreatedSubscription> {
        self.dispatcher.rotate_signing_secret(id, owner).await.into()
    }

    pub async fn list_deliveries(
        &self,
        id: ResourceId,
        owner: &str,
    ) -> ServiceResponse<Vec<DeliveryRecord>> {
        self.dispatcher.list_deliveries(id, owner).await.into()
    }

    /// Emit a domain event such as a whitelist change. Returns the event id
    /// once delivery is scheduled.
    pub async fn emit_event(&self, event: WebhookEvent) -> ServiceResponse<ResourceId> {
        self.dispatcher
            .emit_event(event)
            .await
            .map(|ticket| ticket.event_id())
            .into()
    }
}
