//! Deployment status state machine for TokenForge.
//!
//! Validates and records every lifecycle transition of a token deployment,
//! persists through a [`tokenforge_db::DeploymentStore`] and hands domain
//! events to an [`tokenforge_core::webhook::EventPublisher`].

pub mod events;
pub mod lifecycle;

pub use lifecycle::DeploymentLifecycle;
