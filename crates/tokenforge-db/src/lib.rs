//! Storage layer for TokenForge.
//!
//! Provides store traits and in-memory implementations. A durable backend
//! implements the same traits and is swapped in without touching the
//! lifecycle, exporter or dispatcher.

pub mod error;
pub mod store;

pub use error::{DbError, DbResult};
pub use store::*;
