//! Event fan-out and background delivery.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokenforge_config::WebhookConfig;
use tokenforge_core::lock::KeyedLocks;
use tokenforge_core::webhook::{DeliveryRecord, EventPublisher, Subscription, WebhookEvent};
use tokenforge_core::{Error, ResourceId, Result};
use tokenforge_db::WebhookStore;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::payload::WebhookPayload;
use crate::signing::sign_payload;
use crate::transport::{OutboundRequest, WebhookTransport};

/// Selects matching subscriptions for an event and delivers signed payloads
/// in the background.
///
/// Outbound concurrency is capped by a semaphore sized from
/// `max_concurrent_deliveries`; each attempt is bounded by `delivery_timeout_ms`.
pub struct WebhookDispatcher {
    pub(crate) store: Arc<dyn WebhookStore>,
    transport: Arc<dyn WebhookTransport>,
    config: Arc<WebhookConfig>,
    permits: Arc<Semaphore>,
    pub(crate) locks: KeyedLocks<ResourceId>,
}

/// Handle to the deliveries scheduled for one event.
///
/// Dropping the ticket detaches the deliveries; they still run to completion.
#[derive(Debug)]
pub struct DispatchTicket {
    event_id: ResourceId,
    deliveries: Vec<JoinHandle<Vec<DeliveryRecord>>>,
}

impl DispatchTicket {
    pub fn event_id(&self) -> ResourceId {
        self.event_id
    }

    /// Number of subscriptions a delivery was scheduled for.
    pub fn scheduled(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait for every scheduled delivery and collect all attempt records.
    pub async fn wait(self) -> Vec<DeliveryRecord> {
        let mut records = Vec::new();
        for outcome in futures::future::join_all(self.deliveries).await {
            match outcome {
                Ok(attempts) => records.extend(attempts),
                Err(e) => warn!(error = %e, "Webhook delivery task aborted"),
            }
        }
        records
    }
}

/// Everything a delivery task needs, shared across its attempts.
struct Delivery {
    subscription: Subscription,
    event_id: ResourceId,
    payload: Arc<WebhookPayload>,
    body: Arc<Vec<u8>>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        transport: Arc<dyn WebhookTransport>,
        config: WebhookConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1)));
        Self {
            store,
            transport,
            config: Arc::new(config),
            permits,
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Schedule delivery of `event` to every matching active subscription.
    ///
    /// Returns once the deliveries are spawned. Delivery failures are recorded
    /// in the delivery log and never surface here.
    pub async fn emit_event(&self, event: WebhookEvent) -> Result<DispatchTicket> {
        let candidates = self.store.list_active_for(event.event_type).await?;
        let matching: Vec<Subscription> = candidates
            .into_iter()
            .filter(|s| s.matches(&event))
            .collect();

        let payload = Arc::new(WebhookPayload::from_event(event));
        let event_id = payload.id;

        if matching.is_empty() {
            debug!(
                event_id = %event_id,
                event_type = %payload.event_type,
                "No subscriptions match event"
            );
            return Ok(DispatchTicket {
                event_id,
                deliveries: Vec::new(),
            });
        }

        let body = Arc::new(
            payload
                .to_body()
                .map_err(|e| Error::Internal(format!("failed to serialize event: {}", e)))?,
        );

        info!(
            event_id = %event_id,
            event_type = %payload.event_type,
            subscribers = matching.len(),
            "Dispatching webhook event"
        );

        let deliveries = matching
            .into_iter()
            .map(|subscription| {
                let delivery = Delivery {
                    subscription,
                    event_id,
                    payload: payload.clone(),
                    body: body.clone(),
                };
                tokio::spawn(Self::deliver(
                    self.store.clone(),
                    self.transport.clone(),
                    self.config.clone(),
                    self.permits.clone(),
                    delivery,
                ))
            })
            .collect();

        Ok(DispatchTicket {
            event_id,
            deliveries,
        })
    }

    /// Run every attempt for one subscription, recording each outcome.
    async fn deliver(
        store: Arc<dyn WebhookStore>,
        transport: Arc<dyn WebhookTransport>,
        config: Arc<WebhookConfig>,
        permits: Arc<Semaphore>,
        delivery: Delivery,
    ) -> Vec<DeliveryRecord> {
        let subscription = &delivery.subscription;
        let signature = sign_payload(&subscription.signing_secret, &delivery.body);
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (config.signature_header.clone(), signature),
            (
                "X-Webhook-Event".to_string(),
                delivery.payload.event_type.to_string(),
            ),
            ("X-Webhook-Delivery".to_string(), delivery.event_id.to_string()),
        ];

        let max_attempts = config.max_attempts.max(1);
        let mut records = Vec::new();

        for attempt in 1..=max_attempts {
            let backoff = config.backoff_for(attempt);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }

            let request = OutboundRequest {
                url: subscription.url.clone(),
                headers: headers.clone(),
                body: delivery.body.as_ref().clone(),
            };

            // Only the outbound call holds a permit, not the backoff sleep.
            let Ok(_permit) = permits.acquire().await else {
                break;
            };
            let started = Instant::now();
            let outcome =
                tokio::time::timeout(config.delivery_timeout(), transport.post(request)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let (success, status_code, error) = match outcome {
                Ok(Ok(code)) if (200..300).contains(&code) => (true, Some(code), None),
                Ok(Ok(code)) => (false, Some(code), Some(format!("HTTP {}", code))),
                Ok(Err(e)) => (false, None, Some(e.to_string())),
                Err(_) => (
                    false,
                    None,
                    Some(format!(
                        "timed out after {}ms",
                        config.delivery_timeout_ms
                    )),
                ),
            };

            let record = DeliveryRecord {
                id: ResourceId::new(),
                subscription_id: subscription.id,
                event_id: delivery.event_id,
                event_type: delivery.payload.event_type,
                attempt,
                success,
                status_code,
                latency_ms,
                error,
                delivered_at: Utc::now(),
            };

            if success {
                debug!(
                    subscription_id = %subscription.id,
                    event_id = %delivery.event_id,
                    attempt,
                    latency_ms,
                    "Webhook delivered"
                );
            } else {
                warn!(
                    subscription_id = %subscription.id,
                    event_id = %delivery.event_id,
                    attempt,
                    max_attempts,
                    error = ?record.error,
                    "Webhook delivery attempt failed"
                );
            }

            if let Err(e) = store.record_delivery(record.clone()).await {
                warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to record webhook delivery"
                );
            }
            records.push(record);

            if success {
                break;
            }
        }

        records
    }
}

#[async_trait]
impl EventPublisher for WebhookDispatcher {
    async fn publish(&self, event: WebhookEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.emit_event(event).await {
            warn!(event_type = %event_type, error = %e, "Failed to dispatch webhook event");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::TransportError;
    use crate::signing::verify_signature;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokenforge_core::webhook::{CreateSubscriptionRequest, EventType};
    use tokenforge_db::MemoryWebhookStore;

    /// Scripted transport: pops a response per call, defaults to 200.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub requests: Mutex<Vec<OutboundRequest>>,
        responses: Mutex<VecDeque<std::result::Result<u16, TransportError>>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockTransport {
        pub fn with_responses(
            responses: Vec<std::result::Result<u16, TransportError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookTransport for MockTransport {
        async fn post(
            &self,
            request: OutboundRequest,
        ) -> std::result::Result<u16, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(200))
        }
    }

    pub(crate) fn test_config() -> WebhookConfig {
        WebhookConfig {
            retry_backoff_ms: 0,
            delivery_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn dispatcher(
        transport: Arc<MockTransport>,
        config: WebhookConfig,
    ) -> (WebhookDispatcher, Arc<MemoryWebhookStore>) {
        let store = Arc::new(MemoryWebhookStore::new());
        (
            WebhookDispatcher::new(store.clone(), transport, config),
            store,
        )
    }

    fn request(types: &[EventType], asset: Option<&str>) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            url: "https://hooks.example.com/tokens".to_string(),
            event_types: types.to_vec(),
            asset_id_filter: asset.map(str::to_string),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_no_matching_subscription_schedules_nothing() {
        let transport = Arc::new(MockTransport::default());
        let (dispatcher, _) = dispatcher(transport.clone(), test_config());
        dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], Some("asset-1")), "alice")
            .await
            .unwrap();

        let wrong_type = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistRemoved).asset_id("asset-1"))
            .await
            .unwrap();
        let wrong_asset = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded).asset_id("asset-2"))
            .await
            .unwrap();

        assert_eq!(wrong_type.scheduled(), 0);
        assert_eq!(wrong_asset.scheduled(), 0);
        assert!(wrong_asset.wait().await.is_empty());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_is_signed_with_subscription_secret() {
        let transport = Arc::new(MockTransport::default());
        let (dispatcher, store) = dispatcher(transport.clone(), test_config());
        let created = dispatcher
            .create_subscription(request(&[EventType::TokenDeploymentCompleted], None), "alice")
            .await
            .unwrap();

        let ticket = dispatcher
            .emit_event(
                WebhookEvent::new(EventType::TokenDeploymentCompleted)
                    .asset_id("777")
                    .with_data("deployment_id", "d-1"),
            )
            .await
            .unwrap();
        let event_id = ticket.event_id();
        assert_eq!(ticket.scheduled(), 1);
        let records = ticket.wait().await;

        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].status_code, Some(200));

        let requests = transport.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.url, "https://hooks.example.com/tokens");
        assert_eq!(sent.header("X-Webhook-Event"), Some("TokenDeploymentCompleted"));
        assert_eq!(sent.header("X-Webhook-Delivery"), Some(event_id.to_string().as_str()));
        assert!(verify_signature(
            &created.signing_secret,
            &sent.body,
            sent.header("X-Webhook-Signature")
        ));

        let payload: WebhookPayload = serde_json::from_slice(&sent.body).unwrap();
        assert_eq!(payload.id, event_id);
        assert_eq!(payload.asset_id.as_deref(), Some("777"));

        let log = store.list_deliveries(created.subscription.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event_id, event_id);
    }

    #[tokio::test]
    async fn test_fans_out_to_each_matching_subscriber_with_own_secret() {
        let transport = Arc::new(MockTransport::default());
        let (dispatcher, _) = dispatcher(transport.clone(), test_config());
        let a = dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();
        let b = dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], Some("asset-1")), "bob")
            .await
            .unwrap();

        let ticket = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded).asset_id("asset-1"))
            .await
            .unwrap();
        assert_eq!(ticket.scheduled(), 2);
        ticket.wait().await;

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for secret in [&a.signing_secret, &b.signing_secret] {
            assert_eq!(
                requests
                    .iter()
                    .filter(|r| verify_signature(secret, &r.body, r.header("X-Webhook-Signature")))
                    .count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_failed_attempts_are_retried_and_logged() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            Ok(503),
            Err(TransportError::Connect("refused".to_string())),
            Ok(204),
        ]));
        let (dispatcher, store) = dispatcher(transport.clone(), test_config());
        let created = dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();

        let records = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap()
            .wait()
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].status_code, Some(503));
        assert_eq!(records[0].error.as_deref(), Some("HTTP 503"));
        assert!(records[1].error.as_deref().unwrap().contains("refused"));
        assert!(records[2].success);
        assert_eq!(
            records.iter().map(|r| r.attempt).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            store.list_deliveries(created.subscription.id).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            Ok(500),
            Ok(500),
            Ok(500),
            Ok(500),
        ]));
        let config = WebhookConfig {
            max_attempts: 2,
            ..test_config()
        };
        let (dispatcher, _) = dispatcher(transport.clone(), config);
        dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();

        let records = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap()
            .wait()
            .await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.success));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_times_out() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(500)));
        let config = WebhookConfig {
            delivery_timeout_ms: 50,
            max_attempts: 1,
            ..test_config()
        };
        let (dispatcher, _) = dispatcher(transport, config);
        dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();

        let started = Instant::now();
        let records = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap()
            .wait()
            .await;

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].error.as_deref(), Some("timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_emit_returns_before_delivery_completes() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(300)));
        let (dispatcher, _) = dispatcher(transport, test_config());
        dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();

        let started = Instant::now();
        let ticket = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(ticket.wait().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let transport = Arc::new(MockTransport::with_delay(Duration::from_millis(20)));
        let config = WebhookConfig {
            max_concurrent_deliveries: 2,
            ..test_config()
        };
        let (dispatcher, _) = dispatcher(transport.clone(), config);
        for i in 0..6 {
            dispatcher
                .create_subscription(
                    request(&[EventType::WhitelistAdded], None),
                    &format!("owner-{}", i),
                )
                .await
                .unwrap();
        }

        let ticket = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap();
        assert_eq!(ticket.scheduled(), 6);
        assert_eq!(ticket.wait().await.len(), 6);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_inactive_subscription_is_skipped() {
        let transport = Arc::new(MockTransport::default());
        let (dispatcher, _) = dispatcher(transport.clone(), test_config());
        let created = dispatcher
            .create_subscription(request(&[EventType::WhitelistAdded], None), "alice")
            .await
            .unwrap();
        dispatcher
            .update_subscription(
                created.subscription.id,
                tokenforge_core::webhook::UpdateSubscriptionRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
                "alice",
            )
            .await
            .unwrap();

        let ticket = dispatcher
            .emit_event(WebhookEvent::new(EventType::WhitelistAdded))
            .await
            .unwrap();
        assert_eq!(ticket.scheduled(), 0);
    }

    #[tokio::test]
    async fn test_publish_swallows_failures() {
        let transport = Arc::new(MockTransport::with_responses(vec![Ok(500), Ok(500), Ok(500)]));
        let (dispatcher, store) = dispatcher(transport.clone(), test_config());
        let created = dispatcher
            .create_subscription(request(&[EventType::TokenDeploymentFailed], None), "alice")
            .await
            .unwrap();

        dispatcher
            .publish(WebhookEvent::new(EventType::TokenDeploymentFailed))
            .await;

        // Delivery happens in the background; poll the log.
        let mut attempts = 0;
        for _ in 0..100 {
            attempts = store
                .list_deliveries(created.subscription.id)
                .await
                .unwrap()
                .len();
            if attempts == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(attempts, 3);
    }
}
