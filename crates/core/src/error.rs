//! Error taxonomy for the progress engine.
//!
//! All four kinds are recovered at the request boundary and returned
//! as structured errors; none should take the process down. `Validation`,
//! `InvalidTransition` and `Conflict` are not transient and must never
//! be retried automatically.

use thiserror::Error;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Malformed input: rating out of range, unknown poll option,
    /// missing required field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Action attempted against an entity not in the required prior
    /// state. Carries the actual current state so the client can
    /// resynchronize.
    #[error("cannot {action}: current state is {current}")]
    InvalidTransition {
        /// The action that was attempted.
        action: &'static str,
        /// The entity's actual persisted state.
        current: String,
    },

    /// Uniqueness violation: duplicate poll response, duplicate active
    /// poll, replayed XP award. The first writer already succeeded;
    /// this outcome is terminal for the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Reference to a nonexistent project/milestone/team/poll.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying store failure (I/O, serialization, connectivity).
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Build an `InvalidTransition` error for `action` against `current`.
    pub fn invalid_transition(action: &'static str, current: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            action,
            current: current.to_string(),
        }
    }

    /// Machine-readable kind tag, stable across messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Conflict(_) => "conflict_error",
            Self::NotFound(_) => "not_found_error",
            Self::Storage(_) => "storage_error",
        }
    }
}
