//! Webhook subscription and event types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{Error, ResourceId};

/// Kinds of events subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    TokenDeploymentStarted,
    TokenDeploymentCompleted,
    TokenDeploymentFailed,
    WhitelistAdded,
    WhitelistRemoved,
    ComplianceStatusChanged,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::TokenDeploymentStarted,
        EventType::TokenDeploymentCompleted,
        EventType::TokenDeploymentFailed,
        EventType::WhitelistAdded,
        EventType::WhitelistRemoved,
        EventType::ComplianceStatusChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TokenDeploymentStarted => "TokenDeploymentStarted",
            EventType::TokenDeploymentCompleted => "TokenDeploymentCompleted",
            EventType::TokenDeploymentFailed => "TokenDeploymentFailed",
            EventType::WhitelistAdded => "WhitelistAdded",
            EventType::WhitelistRemoved => "WhitelistRemoved",
            EventType::ComplianceStatusChanged => "ComplianceStatusChanged",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown event type: {}", s)))
    }
}

/// An event to fan out to subscribers. Not persisted beyond delivery logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: EventType,
    pub asset_id: Option<String>,
    pub network: Option<String>,
    pub actor: Option<String>,
    pub affected_address: Option<String>,
    /// Opaque payload. A sorted map so serialization is canonical.
    pub data: BTreeMap<String, serde_json::Value>,
}

impl WebhookEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            asset_id: None,
            network: None,
            actor: None,
            affected_address: None,
            data: BTreeMap::new(),
        }
    }

    pub fn asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn affected_address(mut self, address: impl Into<String>) -> Self {
        self.affected_address = Some(address.into());
        self
    }

    pub fn with_data(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A registered webhook endpoint.
///
/// The signing secret is kept here for delivery; it leaves the store only
/// through [`CreatedSubscription`] and explicit rotation.
#[derive(Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: ResourceId,
    pub url: String,
    pub event_types: BTreeSet<EventType>,
    pub asset_id_filter: Option<String>,
    pub description: String,
    pub signing_secret: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("event_types", &self.event_types)
            .field("asset_id_filter", &self.asset_id_filter)
            .field("description", &self.description)
            .field("signing_secret", &"<redacted>")
            .field("created_by", &self.created_by)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Subscription {
    /// Whether this subscription should receive `event`.
    pub fn matches(&self, event: &WebhookEvent) -> bool {
        self.is_active
            && self.event_types.contains(&event.event_type)
            && match &self.asset_id_filter {
                None => true,
                Some(filter) => event.asset_id.as_deref() == Some(filter.as_str()),
            }
    }

    pub fn view(&self) -> SubscriptionView {
        SubscriptionView {
            id: self.id,
            url: self.url.clone(),
            event_types: self.event_types.clone(),
            asset_id_filter: self.asset_id_filter.clone(),
            description: self.description.clone(),
            created_by: self.created_by.clone(),
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Subscription as shown to its owner after creation: no secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionView {
    pub id: ResourceId,
    pub url: String,
    pub event_types: BTreeSet<EventType>,
    pub asset_id_filter: Option<String>,
    pub description: String,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned exactly once, when a subscription is created or its secret rotated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionView,
    pub signing_secret: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub url: String,
    pub event_types: Vec<EventType>,
    pub asset_id_filter: Option<String>,
    pub description: Option<String>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub url: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    /// `Some(None)` (an explicit `null`) clears the filter.
    #[serde(default, deserialize_with = "explicit_null")]
    pub asset_id_filter: Option<Option<String>>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Keep a present `null` distinct from an absent field.
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: ResourceId,
    pub subscription_id: ResourceId,
    pub event_id: ResourceId,
    pub event_type: EventType,
    pub attempt: u32,
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// Sink for domain events. The webhook dispatcher implements this; the
/// lifecycle only sees the trait.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Schedule delivery of `event`. Must not wait for delivery to finish
    /// and must not fail the caller.
    async fn publish(&self, event: WebhookEvent);
}
