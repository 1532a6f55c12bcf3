//! Component wiring.

use std::path::Path;
use std::sync::Arc;
use tokenforge_audit::AuditExporter;
use tokenforge_config::{TokenForgeConfig, load_config, parse_config};
use tokenforge_core::webhook::EventPublisher;
use tokenforge_db::{DeploymentStore, MemoryDeploymentStore, MemoryWebhookStore, WebhookStore};
use tokenforge_lifecycle::DeploymentLifecycle;
use tokenforge_webhooks::{HttpTransport, WebhookDispatcher, WebhookTransport};
use tracing::info;

use crate::ServiceError;

/// Shared TokenForge components. Cheap to clone.
#[derive(Clone)]
pub struct TokenForge {
    pub(crate) config: Arc<TokenForgeConfig>,
    pub lifecycle: Arc<DeploymentLifecycle>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub exporter: Arc<AuditExporter>,
}

impl TokenForge {
    /// In-memory stores and an HTTP transport built from `config`.
    pub fn new(config: TokenForgeConfig) -> Result<Self, ServiceError> {
        let transport = HttpTransport::new(&config.webhooks)?;
        Ok(Self::with_components(
            config,
            Arc::new(MemoryDeploymentStore::new()),
            Arc::new(MemoryWebhookStore::new()),
            Arc::new(transport),
        ))
    }

    /// Build from a KDL document.
    pub fn from_kdl(source: &str) -> Result<Self, ServiceError> {
        Self::new(parse_config(source)?)
    }

    /// Build from a KDL file on disk.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        Self::new(load_config(path)?)
    }

    /// Wire the components over caller-provided stores and transport.
    ///
    /// The lifecycle and the exporter share `deployments`; lifecycle events
    /// go straight to the dispatcher.
    pub fn with_components(
        config: TokenForgeConfig,
        deployments: Arc<dyn DeploymentStore>,
        webhooks: Arc<dyn WebhookStore>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        let dispatcher = Arc::new(WebhookDispatcher::new(
            webhooks,
            transport,
            config.webhooks.clone(),
        ));
        let publisher: Arc<dyn EventPublisher> = dispatcher.clone();
        let lifecycle = Arc::new(DeploymentLifecycle::new(deployments.clone(), publisher));
        let exporter = Arc::new(AuditExporter::new(deployments, config.audit.clone()));

        info!(
            max_page_size = config.audit.max_page_size,
            max_concurrent_deliveries = config.webhooks.max_concurrent_deliveries,
            "TokenForge components initialized"
        );

        Self {
            config: Arc::new(config),
            lifecycle,
            dispatcher,
            exporter,
        }
    }

    pub fn config(&self) -> &TokenForgeConfig {
        &self.config
    }
}
