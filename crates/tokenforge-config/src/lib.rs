//! KDL configuration parsing for TokenForge.
//!
//! A configuration file has two optional blocks:
//!
//! ```kdl
//! audit {
//!     max-page-size 500
//!     cache-ttl-secs 3600
//! }
//! webhooks {
//!     delivery-timeout-ms 5000
//!     signature-header "X-Signature"
//! }
//! ```
//!
//! Every option has a default, so an empty document is a valid configuration.

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{AuditConfig, TokenForgeConfig, WebhookConfig, load_config, parse_config};
