//! Caller-facing errors and the response envelope.

use serde::Serialize;
use thiserror::Error;
use tokenforge_config::ConfigError;
use tokenforge_webhooks::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Configuration(_) => "configuration",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<tokenforge_core::Error> for ServiceError {
    fn from(err: tokenforge_core::Error) -> Self {
        use tokenforge_core::Error;

        let message = err.to_string();
        match err {
            Error::NotFound(_) => ServiceError::NotFound(message),
            Error::Validation(_) => ServiceError::BadRequest(message),
            Error::PermissionDenied(_) => ServiceError::Forbidden(message),
            Error::IdempotencyConflict | Error::InvalidTransition { .. } | Error::Conflict(_) => {
                ServiceError::Conflict(message)
            }
            Error::Timeout(_) => ServiceError::Timeout(message),
            Error::DeliveryFailed(_) | Error::Internal(_) => ServiceError::Internal(message),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        ServiceError::Configuration(err.to_string())
    }
}

impl From<TransportError> for ServiceError {
    fn from(err: TransportError) -> Self {
        ServiceError::Internal(format!("webhook transport unavailable: {}", err))
    }
}

/// Envelope returned by every service operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_code: None,
            message: None,
        }
    }

    pub fn failed(error: ServiceError) -> Self {
        Self {
            success: false,
            data: None,
            error_code: Some(error.code()),
            message: Some(error.to_string()),
        }
    }

    pub fn into_result(self) -> Result<T, ServiceError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(ServiceError::Internal(
                self.message.unwrap_or_else(|| "operation failed".to_string()),
            )),
        }
    }
}

impl<T, E: Into<ServiceError>> From<Result<T, E>> for ServiceResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => ServiceResponse::ok(data),
            Err(e) => ServiceResponse::failed(e.into()),
        }
    }
}
