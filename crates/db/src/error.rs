//! Store error types.

use sea_orm::DbErr;
use thiserror::Error;

use salyq_shared::AppError;

/// Result type alias using `StoreError`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or catalog-structure violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation precondition does not hold.
    #[error("unprocessable: {0}")]
    Unprocessable(String),

    /// A persisted value could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Unprocessable(msg) => Self::Unprocessable(msg),
            StoreError::Corrupt(msg) => Self::Internal(msg),
            StoreError::Database(db) => Self::Database(db.to_string()),
        }
    }
}
