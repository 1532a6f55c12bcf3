//! Wire body for webhook deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokenforge_core::ResourceId;
use tokenforge_core::webhook::{EventType, WebhookEvent};

/// JSON body posted to subscribers.
///
/// Field order is fixed by the struct and `data` is a sorted map, so the
/// serialized form is canonical and the same bytes are signed for every
/// subscriber of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: ResourceId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub asset_id: Option<String>,
    pub network: Option<String>,
    pub actor: Option<String>,
    pub affected_address: Option<String>,
    pub data: BTreeMap<String, serde_json::Value>,
}

impl WebhookPayload {
    /// Stamp an event with a fresh id and emission time.
    pub fn from_event(event: WebhookEvent) -> Self {
        Self {
            id: ResourceId::new(),
            event_type: event.event_type,
            timestamp: Utc::now(),
            asset_id: event.asset_id,
            network: event.network,
            actor: event.actor,
            affected_address: event.affected_address,
            data: event.data,
        }
    }

    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
