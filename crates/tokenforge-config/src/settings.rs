//! Runtime settings for the audit exporter and webhook dispatcher.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenForgeConfig {
    pub audit: AuditConfig,
    pub webhooks: WebhookConfig,
}

/// Audit export options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Hard ceiling on `page_size` for bulk exports.
    pub max_page_size: u32,
    /// Page size used by callers that do not pick one.
    pub default_page_size: u32,
    /// How long a cached bulk export stays valid.
    pub cache_ttl_secs: u64,
    /// Upper bound on cached idempotency keys; the oldest is evicted first.
    pub cache_max_entries: usize,
    /// Deadline for producing one bulk export.
    pub export_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1000,
            default_page_size: 100,
            cache_ttl_secs: 24 * 60 * 60,
            cache_max_entries: 10_000,
            export_timeout_ms: 30_000,
        }
    }
}

impl AuditConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }
}

/// Webhook delivery options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-attempt timeout for one HTTP delivery.
    pub delivery_timeout_ms: u64,
    /// Deliveries allowed in flight at once across all subscribers.
    pub max_concurrent_deliveries: usize,
    /// Attempts per delivery, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts; doubles after each failure.
    pub retry_backoff_ms: u64,
    /// Header carrying the `sha256=<hex>` payload signature.
    pub signature_header: String,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 10_000,
            max_concurrent_deliveries: 32,
            max_attempts: 3,
            retry_backoff_ms: 500,
            signature_header: "X-Webhook-Signature".to_string(),
            user_agent: "TokenForge-Webhooks/1.0".to_string(),
        }
    }
}

impl WebhookConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Delay before attempt number `attempt` (1-based). No delay before the first.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Parse configuration from KDL text.
pub fn parse_config(kdl: &str) -> ConfigResult<TokenForgeConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = TokenForgeConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "audit" => parse_audit(node, &mut config.audit)?,
            "webhooks" => parse_webhooks(node, &mut config.webhooks)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

/// Read and parse a KDL configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<TokenForgeConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

fn parse_audit(node: &KdlNode, audit: &mut AuditConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        let field = child.name().value();
        match field {
            "max-page-size" => audit.max_page_size = positive_int(child, field)?,
            "default-page-size" => audit.default_page_size = positive_int(child, field)?,
            "cache-ttl-secs" => audit.cache_ttl_secs = positive_int(child, field)?,
            "cache-max-entries" => audit.cache_max_entries = positive_int(child, field)?,
            "export-timeout-ms" => audit.export_timeout_ms = positive_int(child, field)?,
            _ => {}
        }
    }

    if audit.default_page_size > audit.max_page_size {
        return Err(ConfigError::InvalidValue {
            field: "default-page-size".to_string(),
            message: format!(
                "{} exceeds max-page-size {}",
                audit.default_page_size, audit.max_page_size
            ),
        });
    }

    Ok(())
}

fn parse_webhooks(node: &KdlNode, webhooks: &mut WebhookConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        let field = child.name().value();
        match field {
            "delivery-timeout-ms" => webhooks.delivery_timeout_ms = positive_int(child, field)?,
            "max-concurrent-deliveries" => {
                webhooks.max_concurrent_deliveries = positive_int(child, field)?
            }
            "max-attempts" => webhooks.max_attempts = positive_int(child, field)?,
            "retry-backoff-ms" => webhooks.retry_backoff_ms = non_negative_int(child, field)?,
            "signature-header" => webhooks.signature_header = non_empty_string(child, field)?,
            "user-agent" => webhooks.user_agent = non_empty_string(child, field)?,
            _ => {}
        }
    }

    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn non_negative_int<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    let value = get_first_arg(node)
        .ok_or_else(|| ConfigError::MissingValue(field.to_string()))?
        .as_integer()
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer".to_string(),
        })?;

    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is out of range", value),
    })
}

fn positive_int<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    let value: i128 = non_negative_int(node, field)?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be positive, got {}", value),
        });
    }
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is out of range", value),
    })
}

fn non_empty_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    let value = get_first_arg(node)
        .ok_or_else(|| ConfigError::MissingValue(field.to_string()))?
        .as_string()
        .map(str::trim)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a string".to_string(),
        })?;

    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(value.to_string())
}
