//! Error types for TokenForge.

use thiserror::Error;

use crate::deployment::DeploymentStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("idempotency key reused with different request parameters")]
    IdempotencyConflict,

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
