//! Store traits and implementations.

pub mod deployment;
pub mod webhook;

pub use deployment::{DeploymentStore, MemoryDeploymentStore};
pub use webhook::{MemoryWebhookStore, WebhookStore};
