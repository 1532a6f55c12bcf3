//! Audit trail export for TokenForge.
//!
//! Rebuilds the status history of one deployment or a filtered page of
//! deployments and renders it as JSON or CSV. Bulk exports can carry an
//! idempotency key; a retried request with the same key and the same
//! parameters gets the original payload back without touching the store.

mod cache;
pub mod csv;
pub mod exporter;
pub mod fingerprint;

pub use exporter::{AuditExporter, BulkAuditDocument, DeploymentAudit};
pub use fingerprint::request_fingerprint;
