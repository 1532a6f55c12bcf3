//! Outbound HTTP transport for webhook deliveries.

use async_trait::async_trait;
use std::time::Duration;
use tokenforge_config::WebhookConfig;

use crate::TransportError;

/// A fully signed request ready to be sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends a webhook request and reports the HTTP status code.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<u16, TransportError>;
}

/// [`WebhookTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &WebhookConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout())
            .connect_timeout(config.delivery_timeout().min(Duration::from_secs(5)))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<u16, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

    async fn receive(
        State(received): State<Received>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        received.lock().unwrap().push((headers, body));
        StatusCode::ACCEPTED
    }

    async fn slow() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(2)).await;
        StatusCode::OK
    }

    async fn spawn_receiver() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/hook", post(receive))
            .route("/slow", post(slow))
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), received)
    }

    #[tokio::test]
    async fn test_post_sends_headers_and_body() {
        let (base, received) = spawn_receiver().await;
        let transport = HttpTransport::new(&WebhookConfig::default()).unwrap();

        let status = transport
            .post(OutboundRequest {
                url: format!("{}/hook", base),
                headers: vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("X-Webhook-Signature".to_string(), "sha256=00".to_string()),
                ],
                body: br#"{"ok":true}"#.to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(status, 202);
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let (headers, body) = &received[0];
        assert_eq!(headers["x-webhook-signature"], "sha256=00");
        assert_eq!(headers["user-agent"], "TokenForge-Webhooks/1.0");
        assert_eq!(body.as_ref(), br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_post_times_out() {
        let (base, _) = spawn_receiver().await;
        let config = WebhookConfig {
            delivery_timeout_ms: 100,
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        let result = transport
            .post(OutboundRequest {
                url: format!("{}/slow", base),
                headers: vec![],
                body: vec![],
            })
            .await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_unknown_route_reports_status() {
        let (base, _) = spawn_receiver().await;
        let transport = HttpTransport::new(&WebhookConfig::default()).unwrap();
        let status = transport
            .post(OutboundRequest {
                url: format!("{}/missing", base),
                headers: vec![],
                body: vec![],
            })
            .await
            .unwrap();
        assert_eq!(status, 404);
    }
}
