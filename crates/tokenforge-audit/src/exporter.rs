//! Single and bulk audit exports.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokenforge_config::AuditConfig;
use tokenforge_core::audit::{BulkExportRequest, ExportFormat, ExportResult};
use tokenforge_core::deployment::{Deployment, PageRequest, StatusEntry};
use tokenforge_core::lock::KeyedLocks;
use tokenforge_core::{DeploymentId, Error, Result};
use tokenforge_db::DeploymentStore;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheLookup, ExportCache};
use crate::csv;
use crate::fingerprint::request_fingerprint;

/// One deployment together with its full status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentAudit {
    pub deployment_id: DeploymentId,
    #[serde(flatten)]
    pub deployment: Deployment,
    pub status_history: Vec<StatusEntry>,
}

/// JSON body of a bulk export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAuditDocument {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub record_count: usize,
    pub deployments: Vec<DeploymentAudit>,
}

/// Builds audit exports from the deployment store.
///
/// Bulk exports sharing an idempotency key are serialized, so concurrent
/// retries resolve to whichever export populated the cache first.
pub struct AuditExporter {
    store: Arc<dyn DeploymentStore>,
    config: AuditConfig,
    cache: Mutex<ExportCache>,
    locks: KeyedLocks<String>,
}

impl AuditExporter {
    pub fn new(store: Arc<dyn DeploymentStore>, config: AuditConfig) -> Self {
        let cache = ExportCache::new(config.cache_ttl(), config.cache_max_entries);
        Self {
            store,
            config,
            cache: Mutex::new(cache),
            locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Full status history of one deployment.
    pub async fn audit_trail(&self, id: &DeploymentId) -> Result<DeploymentAudit> {
        let deployment = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("deployment {}", id)))?;
        let status_history = self.store.get_history(id).await?;
        Ok(DeploymentAudit {
            deployment_id: deployment.id.clone(),
            deployment,
            status_history,
        })
    }

    pub async fn export_json(&self, id: &DeploymentId) -> Result<String> {
        let audit = self.audit_trail(id).await?;
        to_json(&audit)
    }

    pub async fn export_csv(&self, id: &DeploymentId) -> Result<String> {
        let audit = self.audit_trail(id).await?;
        let mut out = String::new();
        csv::write_header(&mut out);
        csv::write_history(&mut out, &audit.deployment, &audit.status_history);
        Ok(out)
    }

    /// Export a filtered page of deployments.
    ///
    /// Never fails outright: problems are reported in the returned envelope.
    pub async fn export_bulk(
        &self,
        request: BulkExportRequest,
        idempotency_key: Option<&str>,
    ) -> ExportResult {
        let format = request.format;
        let request = match self.normalize(request) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Rejected bulk export request");
                return ExportResult::failure(format, &e);
            }
        };

        let Some(key) = idempotency_key.map(str::trim).filter(|k| !k.is_empty()) else {
            return match self.run_export(&request).await {
                Ok((payload, count)) => ExportResult::fresh(format, payload, count),
                Err(e) => ExportResult::failure(format, &e),
            };
        };

        let key = key.to_string();
        let fingerprint = request_fingerprint(&request);
        let _guard = self.locks.lock(&key).await;

        let cached = self.lock_cache().lookup(&key, &fingerprint, Instant::now());
        match cached {
            CacheLookup::Hit(result) => {
                debug!(idempotency_key = %key, "Bulk export served from cache");
                return result;
            }
            CacheLookup::Conflict => {
                warn!(idempotency_key = %key, "Idempotency key reused with different parameters");
                return ExportResult::failure(format, &Error::IdempotencyConflict);
            }
            CacheLookup::Miss => {}
        }

        match self.run_export(&request).await {
            Ok((payload, record_count)) => {
                self.lock_cache().insert(
                    key.clone(),
                    CacheEntry {
                        fingerprint,
                        payload: payload.clone(),
                        format,
                        record_count,
                        created_at: Instant::now(),
                    },
                );
                info!(idempotency_key = %key, record_count, format = %format, "Bulk export cached");
                ExportResult::fresh(format, payload, record_count)
            }
            Err(e) => ExportResult::failure(format, &e),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ExportCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check paging against the ceiling and canonicalize the filter.
    fn normalize(&self, request: BulkExportRequest) -> Result<BulkExportRequest> {
        let page_size = match request.page_size {
            0 => self.config.default_page_size,
            n => n,
        };
        if page_size > self.config.max_page_size {
            return Err(Error::Validation(format!(
                "page size {} exceeds the maximum of {}",
                page_size, self.config.max_page_size
            )));
        }
        Ok(BulkExportRequest {
            format: request.format,
            page: request.page.max(1),
            page_size,
            filter: request.filter.normalized(),
        })
    }

    async fn run_export(&self, request: &BulkExportRequest) -> Result<(String, usize)> {
        let timeout = self.config.export_timeout();
        match tokio::time::timeout(timeout, self.build_bulk(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.config.export_timeout_ms, "Bulk export timed out");
                Err(Error::Timeout(format!(
                    "bulk export did not finish within {}ms",
                    self.config.export_timeout_ms
                )))
            }
        }
    }

    async fn build_bulk(&self, request: &BulkExportRequest) -> Result<(String, usize)> {
        let page = PageRequest::new(request.page, request.page_size);
        let total_count = self.store.count(&request.filter).await?;
        let deployments = self.store.list(&request.filter, page).await?;

        let mut audits = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let status_history = self.store.get_history(&deployment.id).await?;
            audits.push(DeploymentAudit {
                deployment_id: deployment.id.clone(),
                deployment,
                status_history,
            });
        }
        let record_count = audits.len();

        let payload = match request.format {
            ExportFormat::Json => to_json(&BulkAuditDocument {
                page: page.page,
                page_size: page.page_size,
                total_count,
                record_count,
                deployments: audits,
            })?,
            ExportFormat::Csv => {
                let mut out = String::new();
                csv::write_header(&mut out);
                for audit in &audits {
                    csv::write_history(&mut out, &audit.deployment, &audit.status_history);
                }
                out
            }
        };
        Ok((payload, record_count))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("failed to serialize audit export: {}", e)))
}
