//! TokenForge service wiring.
//!
//! [`TokenForge`] assembles the deployment lifecycle, the webhook dispatcher
//! and the audit exporter over shared stores, and exposes every operation
//! with a [`ServiceResponse`] envelope that callers check for `success`.

pub mod error;
pub mod service;
pub mod state;

pub use error::{ServiceError, ServiceResponse};
pub use service::DeploymentPage;
pub use state::TokenForge;
