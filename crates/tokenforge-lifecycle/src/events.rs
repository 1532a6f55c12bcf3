//! Webhook events raised by deployment transitions.

use serde_json::json;
use tokenforge_core::deployment::{Deployment, DeploymentStatus, StatusEntry};
use tokenforge_core::webhook::{EventType, WebhookEvent};

fn base_event(event_type: EventType, deployment: &Deployment) -> WebhookEvent {
    let mut event = WebhookEvent::new(event_type)
        .network(deployment.network.clone())
        .actor(deployment.deployed_by.clone())
        .with_data("deployment_id", deployment.id.as_str())
        .with_data("token_type", deployment.token_type.clone())
        .with_data("token_name", deployment.token_name.clone())
        .with_data("token_symbol", deployment.token_symbol.clone())
        .with_data("status", deployment.current_status.as_str());

    if let Some(asset) = &deployment.asset_identifier {
        event = event.asset_id(asset.clone());
    }
    if let Some(hash) = &deployment.transaction_hash {
        event = event.with_data("transaction_hash", hash.clone());
    }
    event
}

pub fn deployment_started(deployment: &Deployment) -> WebhookEvent {
    base_event(EventType::TokenDeploymentStarted, deployment)
}

pub fn deployment_completed(deployment: &Deployment) -> WebhookEvent {
    base_event(EventType::TokenDeploymentCompleted, deployment)
        .with_data("completed_at", deployment.updated_at.to_rfc3339())
}

pub fn deployment_failed(
    deployment: &Deployment,
    previous: DeploymentStatus,
    entry: &StatusEntry,
) -> WebhookEvent {
    base_event(EventType::TokenDeploymentFailed, deployment)
        .with_data("previous_status", previous.as_str())
        .with_data(
            "error_message",
            entry
                .error_message
                .clone()
                .unwrap_or_else(|| entry.message.clone()),
        )
        .with_data("is_retryable", json!(entry.retryable.unwrap_or(false)))
}

/// Event to emit for a transition into `entry.status`, if any.
pub fn for_transition(
    deployment: &Deployment,
    previous: DeploymentStatus,
    entry: &StatusEntry,
) -> Option<WebhookEvent> {
    match entry.status {
        DeploymentStatus::Completed => Some(deployment_completed(deployment)),
        DeploymentStatus::Failed => Some(deployment_failed(deployment, previous, entry)),
        _ => None,
    }
}
