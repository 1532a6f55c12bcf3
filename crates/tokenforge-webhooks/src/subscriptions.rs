//! Owner-scoped subscription management.

use chrono::Utc;
use std::collections::BTreeSet;
use tokenforge_core::webhook::{
    CreateSubscriptionRequest, CreatedSubscription, DeliveryRecord, EventType, Subscription,
    SubscriptionView, UpdateSubscriptionRequest,
};
use tokenforge_core::{Error, ResourceId, Result};
use tracing::info;
use url::Url;

use crate::dispatcher::WebhookDispatcher;
use crate::secret::generate_signing_secret;

const MAX_DESCRIPTION_LEN: usize = 500;

/// Subscriber endpoints must be absolute http(s) URLs with a host.
fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| Error::Validation(format!("invalid webhook url '{}': {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "webhook url must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::Validation("webhook url must include a host".to_string()));
    }
    Ok(url.to_string())
}

fn validate_event_types(types: &[EventType]) -> Result<BTreeSet<EventType>> {
    if types.is_empty() {
        return Err(Error::Validation(
            "at least one event type is required".to_string(),
        ));
    }
    Ok(types.iter().copied().collect())
}

fn validate_description(description: Option<&str>) -> Result<String> {
    let description = description.map(str::trim).unwrap_or_default();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::Validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(description.to_string())
}

fn clean_asset_filter(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

impl WebhookDispatcher {
    /// Register a new subscription owned by `owner`.
    ///
    /// The returned value is the only place the signing secret is ever shown.
    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
        owner: &str,
    ) -> Result<CreatedSubscription> {
        if owner.trim().is_empty() {
            return Err(Error::Validation("owner is required".to_string()));
        }
        let url = validate_url(&request.url)?;
        let event_types = validate_event_types(&request.event_types)?;
        let description = validate_description(request.description.as_deref())?;

        let now = Utc::now();
        let subscription = Subscription {
            id: ResourceId::new(),
            url,
            event_types,
            asset_id_filter: clean_asset_filter(request.asset_id_filter.as_deref()),
            description,
            signing_secret: generate_signing_secret(),
            created_by: owner.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let created = self.store.create(subscription).await?;
        info!(
            subscription_id = %created.id,
            owner = %owner,
            event_types = ?created.event_types,
            "Webhook subscription created"
        );

        Ok(CreatedSubscription {
            subscription: created.view(),
            signing_secret: created.signing_secret,
        })
    }

    /// Load a subscription and check that `owner` may touch it.
    async fn owned(&self, id: ResourceId, owner: &str) -> Result<Subscription> {
        let subscription = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;

        if subscription.created_by != owner {
            return Err(Error::PermissionDenied(format!(
                "subscription {} is not owned by the caller",
                id
            )));
        }
        Ok(subscription)
    }

    pub async fn get_subscription(&self, id: ResourceId, owner: &str) -> Result<SubscriptionView> {
        Ok(self.owned(id, owner).await?.view())
    }

    pub async fn list_subscriptions(&self, owner: &str) -> Result<Vec<SubscriptionView>> {
        Ok(self
            .store
            .list_by_owner(owner)
            .await?
            .iter()
            .map(Subscription::view)
            .collect())
    }

    /// Apply a partial update. The signing secret is never changed here.
    pub async fn update_subscription(
        &self,
        id: ResourceId,
        request: UpdateSubscriptionRequest,
        owner: &str,
    ) -> Result<SubscriptionView> {
        let _guard = self.locks.lock(&id).await;
        let mut subscription = self.owned(id, owner).await?;

        if let Some(url) = &request.url {
            subscription.url = validate_url(url)?;
        }
        if let Some(types) = &request.event_types {
            subscription.event_types = validate_event_types(types)?;
        }
        if let Some(filter) = &request.asset_id_filter {
            subscription.asset_id_filter = clean_asset_filter(filter.as_deref());
        }
        if let Some(description) = &request.description {
            subscription.description = validate_description(Some(description.as_str()))?;
        }
        if let Some(active) = request.is_active {
            subscription.is_active = active;
        }
        subscription.updated_at = Utc::now().max(subscription.updated_at);

        let updated = self.store.update(subscription).await?;
        info!(subscription_id = %id, "Webhook subscription updated");
        Ok(updated.view())
    }

    pub async fn delete_subscription(&self, id: ResourceId, owner: &str) -> Result<()> {
        let _guard = self.locks.lock(&id).await;
        self.owned(id, owner).await?;
        self.store.delete(id).await?;
        info!(subscription_id = %id, "Webhook subscription deleted");
        Ok(())
    }

    /// Replace the signing secret. The new secret is returned once.
    pub async fn rotate_signing_secret(
        &self,
        id: ResourceId,
        owner: &str,
    ) -> Result<CreatedSubscription> {
        let _guard = self.locks.lock(&id).await;
        let mut subscription = self.owned(id, owner).await?;
        subscription.signing_secret = generate_signing_secret();
        subscription.updated_at = Utc::now().max(subscription.updated_at);

        let updated = self.store.update(subscription).await?;
        info!(subscription_id = %id, "Webhook signing secret rotated");
        Ok(CreatedSubscription {
            subscription: updated.view(),
            signing_secret: updated.signing_secret,
        })
    }

    /// Delivery attempts for one of the caller's subscriptions, oldest first.
    pub async fn list_deliveries(
        &self,
        id: ResourceId,
        owner: &str,
    ) -> Result<Vec<DeliveryRecord>> {
        self.owned(id, owner).await?;
        Ok(self.store.list_deliveries(id).await?)
    }
}
