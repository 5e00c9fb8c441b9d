//! Error types and error handling for the workflow engine
//!
//! All engine operations return [`Result`]. The taxonomy follows the
//! contract boundaries of the engine:
//!
//! ```text
//! EngineError
//! ├── Validation       - Bad request; rejected before any mutation
//! ├── Forbidden        - Actor not in the resolved role set; no mutation
//! ├── Conflict         - Lost a concurrent advance; re-read and retry
//! ├── Configuration    - Template graph or role wiring is broken; the
//! │                      instance stays put until an administrator fixes it
//! ├── ActionExecution  - External side-effect failed after commit; logged,
//! │                      never rolled back
//! ├── Directory        - Person-directory lookup failed
//! ├── NotFound         - Referenced entity does not exist
//! ├── Store            - Persistence errors
//! └── Serialization    - JSON errors
//! ```
//!
//! `Validation`, `Forbidden` and `Conflict` are always raised *before* the
//! transactional commit, so a caller seeing one of them knows no state
//! changed. `Configuration` is surfaced to the caller and logged as an
//! operational alert; the instance remains stuck rather than silently
//! skipping steps.

use thiserror::Error;

use hrflow_store::{ActionId, PersonId, StepId, StoreError};

/// Convenience result type using [`EngineError`]
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by workflow engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request was invalid; nothing was mutated
    ///
    /// Examples: completing a step that is already completed, omitting the
    /// choice on a branching step, selecting a choice that belongs to a
    /// different step.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The acting person is not in the step's resolved role set
    #[error("Person {actor} is not authorized to act on step {step}")]
    Forbidden { actor: PersonId, step: StepId },

    /// A concurrent writer advanced the same process instance first
    ///
    /// The caller should re-read instance state and retry.
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// The template graph or role wiring is broken
    ///
    /// Examples: a non-terminal step with no resolvable successor, no role
    /// set at step, process or workflow level. Surfaced, logged, never
    /// silently skipped.
    #[error("Template configuration error: {0}")]
    Configuration(String),

    /// An external action side-effect failed after the state transition
    /// committed
    ///
    /// By contract this never rolls back workflow state; it is logged and
    /// reported through [`AdvanceOutcome`](crate::engine::AdvanceOutcome).
    #[error("Action {action} execution failed: {error}")]
    ActionExecution { action: ActionId, error: String },

    /// Organization-directory lookup failed
    #[error("Directory lookup failed: {0}")]
    Directory(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence error
    #[error("Store error: {0}")]
    Store(StoreError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => Self::Conflict(err.to_string()),
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_maps_to_conflict() {
        let err: EngineError = StoreError::VersionConflict {
            record: "process instance x".into(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: EngineError = StoreError::NotFound("transition y".into()).into();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
