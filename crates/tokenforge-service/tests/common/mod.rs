#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use std::time::Duration;
use tokenforge_config::TokenForgeConfig;
use tokenforge_service::TokenForge;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub type Delivered = (HeaderMap, Bytes);

/// Route test logs through `RUST_LOG`; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn forge() -> TokenForge {
    init_tracing();
    let mut config = TokenForgeConfig::default();
    config.webhooks.retry_backoff_ms = 10;
    config.webhooks.delivery_timeout_ms = 2_000;
    TokenForge::new(config).unwrap()
}

async fn receive(
    State(tx): State<mpsc::UnboundedSender<Delivered>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let _ = tx.send((headers, body));
    StatusCode::OK
}

/// Start a subscriber endpoint; returns its URL and the stream of requests it receives.
pub async fn spawn_subscriber() -> (String, mpsc::UnboundedReceiver<Delivered>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route("/hook", post(receive)).with_state(tx);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/hook", addr), rx)
}

pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivered>) -> Delivered {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no webhook delivered within 5s")
        .expect("subscriber closed")
}
