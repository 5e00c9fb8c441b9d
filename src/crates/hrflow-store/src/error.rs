//! Error types for store operations

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Optimistic version guard failed; the caller should re-read and retry
    #[error("Version conflict on {record}: expected {expected}, found {found}")]
    VersionConflict {
        record: String,
        expected: u64,
        found: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure; external [`WorkflowStore`](crate::WorkflowStore)
    /// implementations map their driver errors into this
    #[error("Storage error: {0}")]
    Storage(String),
}
