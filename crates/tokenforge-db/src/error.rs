//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A compare-and-swap precondition did not hold.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for tokenforge_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => tokenforge_core::Error::NotFound(msg),
            DbError::Duplicate(msg) => tokenforge_core::Error::Conflict(msg),
            DbError::Conflict(msg) => tokenforge_core::Error::Conflict(msg),
            DbError::Backend(_) => {
                tokenforge_core::Error::Internal("storage unavailable".to_string())
            }
        }
    }
}
