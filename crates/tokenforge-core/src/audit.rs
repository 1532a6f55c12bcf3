//! Audit export request and response types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;
use crate::deployment::DeploymentFilter;

/// Serialization format of an audit export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::Validation(format!("unsupported export format: {}", other))),
        }
    }
}

/// A paged, filtered export over many deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkExportRequest {
    pub format: ExportFormat,
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub filter: DeploymentFilter,
}

impl BulkExportRequest {
    pub fn new(format: ExportFormat, page: u32, page_size: u32) -> Self {
        Self {
            format,
            page,
            page_size,
            filter: DeploymentFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: DeploymentFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Envelope returned by every bulk export call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub payload: Option<String>,
    pub record_count: usize,
    pub format: ExportFormat,
    pub from_cache: bool,
    pub error_message: Option<String>,
}

impl ExportResult {
    pub fn fresh(format: ExportFormat, payload: String, record_count: usize) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            record_count,
            format,
            from_cache: false,
            error_message: None,
        }
    }

    pub fn cached(format: ExportFormat, payload: String, record_count: usize) -> Self {
        Self {
            from_cache: true,
            ..Self::fresh(format, payload, record_count)
        }
    }

    pub fn failure(format: ExportFormat, error: &Error) -> Self {
        Self {
            success: false,
            payload: None,
            record_count: 0,
            format,
            from_cache: false,
            error_message: Some(error.to_string()),
        }
    }
}
