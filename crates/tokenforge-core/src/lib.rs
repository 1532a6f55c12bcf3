//! Core domain types and traits for TokenForge.
//!
//! This crate contains:
//! - Resource and deployment identifiers
//! - Deployment records, status history and the legal transition table
//! - Webhook subscription and event types, plus the event publisher seam
//! - Audit export request/response types
//! - Per-key locking used to serialize mutations on a single record

pub mod audit;
pub mod deployment;
pub mod error;
pub mod id;
pub mod lock;
pub mod webhook;

pub use error::{Error, Result};
pub use id::{DeploymentId, ResourceId};
