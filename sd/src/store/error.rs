//! Store error types

use thiserror::Error;

/// Errors surfaced by the persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Backend error: {0}")]
    Backend(String),
}
