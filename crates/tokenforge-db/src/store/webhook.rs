//! Webhook store - subscriptions and their delivery log.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokenforge_core::ResourceId;
use tokenforge_core::webhook::{DeliveryRecord, EventType, Subscription};
use tokio::sync::RwLock;

use crate::{DbError, DbResult};

/// Delivery records retained per subscription before the oldest are dropped.
pub const DEFAULT_DELIVERY_LOG_CAPACITY: usize = 1000;

#[async_trait]
pub trait WebhookStore: Send + Sync {
    // Subscriptions
    async fn create(&self, subscription: Subscription) -> DbResult<Subscription>;
    async fn get(&self, id: ResourceId) -> DbResult<Option<Subscription>>;
    async fn update(&self, subscription: Subscription) -> DbResult<Subscription>;
    /// Returns whether a subscription was removed. Its delivery log goes with it.
    async fn delete(&self, id: ResourceId) -> DbResult<bool>;
    async fn list_by_owner(&self, owner: &str) -> DbResult<Vec<Subscription>>;
    /// Active subscriptions registered for `event_type`.
    async fn list_active_for(&self, event_type: EventType) -> DbResult<Vec<Subscription>>;

    // Delivery log
    async fn record_delivery(&self, record: DeliveryRecord) -> DbResult<()>;
    /// Oldest first.
    async fn list_deliveries(&self, subscription_id: ResourceId) -> DbResult<Vec<DeliveryRecord>>;
}

#[derive(Debug, Default)]
struct WebhookTables {
    subscriptions: HashMap<ResourceId, Subscription>,
    deliveries: HashMap<ResourceId, VecDeque<DeliveryRecord>>,
}

/// Process-local implementation of [`WebhookStore`].
#[derive(Debug, Clone)]
pub struct MemoryWebhookStore {
    tables: Arc<RwLock<WebhookTables>>,
    log_capacity: usize,
}

impl Default for MemoryWebhookStore {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_DELIVERY_LOG_CAPACITY)
    }
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            tables: Arc::default(),
            log_capacity: log_capacity.max(1),
        }
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn create(&self, subscription: Subscription) -> DbResult<Subscription> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.contains_key(&subscription.id) {
            return Err(DbError::Duplicate(format!(
                "subscription {}",
                subscription.id
            )));
        }
        tables
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn get(&self, id: ResourceId) -> DbResult<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.get(&id).cloned())
    }

    async fn update(&self, subscription: Subscription) -> DbResult<Subscription> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| DbError::NotFound(format!("subscription {}", subscription.id)))?;
        *slot = subscription.clone();
        Ok(subscription)
    }

    async fn delete(&self, id: ResourceId) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        tables.deliveries.remove(&id);
        Ok(tables.subscriptions.remove(&id).is_some())
    }

    async fn list_by_owner(&self, owner: &str) -> DbResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut owned: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.created_by == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.id);
        Ok(owned)
    }

    async fn list_active_for(&self, event_type: EventType) -> DbResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut active: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.is_active && s.event_types.contains(&event_type))
            .cloned()
            .collect();
        active.sort_by_key(|s| s.id);
        Ok(active)
    }

    async fn record_delivery(&self, record: DeliveryRecord) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.subscriptions.contains_key(&record.subscription_id) {
            // Subscription deleted while the delivery was in flight.
            return Err(DbError::NotFound(format!(
                "subscription {}",
                record.subscription_id
            )));
        }
        let log = tables.deliveries.entry(record.subscription_id).or_default();
        log.push_back(record);
        while log.len() > self.log_capacity {
            log.pop_front();
        }
        Ok(())
    }

    async fn list_deliveries(&self, subscription_id: ResourceId) -> DbResult<Vec<DeliveryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .get(&subscription_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }
}
