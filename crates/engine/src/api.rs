//! Boundary types for engine callers.

use classpulse_core::{EngineError, Time};
use serde::{Deserialize, Serialize};

/// One milestone in a project plan, before IDs are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestonePlan {
    /// Milestone title
    pub title: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    /// Optional due date
    #[serde(default)]
    pub due_date: Option<Time>,

    /// Points the milestone is graded out of; defaults to 100
    #[serde(default)]
    pub points: Option<u32>,
}

/// Wire-shaped error, the one form every failure takes at the boundary.
///
/// `current_state` is present exactly when the failure is an invalid
/// state transition, so clients can render "already turned in" instead
/// of a generic error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable category
    pub kind: &'static str,

    /// Human-readable description
    pub message: String,

    /// The persisted state that rejected the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            current_state: match err {
                EngineError::InvalidTransition { current, .. } => Some(current.clone()),
                _ => None,
            },
        }
    }
}

impl From<EngineError> for ErrorBody {
    fn from(err: EngineError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transitions_expose_the_persisted_state() {
        let err = EngineError::invalid_transition("grade", "assigned");
        let body = ErrorBody::from(&err);
        assert_eq!(body.kind, "invalid_transition");
        assert_eq!(body.current_state.as_deref(), Some("assigned"));

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["current_state"], "assigned");
    }

    #[test]
    fn other_errors_omit_current_state() {
        let body = ErrorBody::from(EngineError::Validation("bad input".into()));
        assert_eq!(body.kind, "validation_error");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("current_state").is_none());
    }
}
