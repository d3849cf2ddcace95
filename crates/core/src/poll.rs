//! Live poll models.

use serde::{Deserialize, Serialize};

use crate::id::{ClassroomId, PollId, StudentId};
use crate::Time;

/// A live poll. At most one poll per classroom is active at any time;
/// that constraint is enforced by the storage layer, not by an
/// in-memory singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    /// Unique identifier
    pub id: PollId,

    /// Classroom the poll runs in
    pub classroom_id: ClassroomId,

    /// The question asked
    pub question: String,

    /// Answer options, in display order
    pub options: Vec<String>,

    /// Whether the poll is currently accepting responses
    pub is_active: bool,

    /// When the poll was opened
    pub created_at: Time,

    /// When the poll was closed, once closed
    pub closed_at: Option<Time>,
}

/// One student's answer to one poll. Unique per `(poll_id,
/// student_id)`: the first write wins and later attempts are rejected,
/// never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    /// Poll answered
    pub poll_id: PollId,

    /// Student answering
    pub student_id: StudentId,

    /// The chosen option; must be a member of the poll's options
    pub option: String,

    /// When the response was recorded
    pub submitted_at: Time,
}

/// Vote count for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTally {
    /// The option text
    pub option: String,

    /// Responses recorded for it
    pub count: usize,
}

/// Aggregated results for a poll, derived from persisted responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResults {
    /// The poll the tallies belong to
    pub poll: Poll,

    /// Per-option counts, in the poll's option order
    pub tallies: Vec<PollTally>,

    /// Total responses recorded
    pub total_responses: usize,
}
