//! Submission lifecycle model.

use serde::{Deserialize, Serialize};

use crate::id::{AssignmentId, ClassroomId, SubmitterId};
use crate::Time;

/// An assignment issued in a classroom. Milestones double as
/// assignments via `AssignmentId::from(MilestoneId)`; this record is
/// for standalone classroom assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique identifier
    pub id: AssignmentId,

    /// Classroom the assignment was issued in
    pub classroom_id: ClassroomId,

    /// Assignment title
    pub title: String,

    /// Due date, if any
    pub due_date: Option<Time>,

    /// Maximum grade
    pub points: u32,

    /// Whether late submissions are accepted
    pub allow_late: bool,

    /// Creation timestamp
    pub created_at: Time,
}

/// Lifecycle status of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Issued, nothing turned in yet
    Assigned,
    /// Work turned in, waiting for grading
    TurnedIn,
    /// Graded by the teacher
    Graded,
    /// Handed back for revision; one resubmission is allowed
    Returned,
}

impl SubmissionStatus {
    /// String form used in stored records and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Assigned => "assigned",
            SubmissionStatus::TurnedIn => "turned_in",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitter's work against one assignment or milestone.
///
/// `(assignment_id, submitter_id)` is the unique key; the record is
/// created implicitly when the assignment is issued and transitions
/// only forward (`assigned → turned_in → graded → returned`, with one
/// explicit resubmission from `returned`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Assignment (or milestone) this work answers
    pub assignment_id: AssignmentId,

    /// Student or team the work belongs to
    pub submitter_id: SubmitterId,

    /// Current lifecycle status
    pub status: SubmissionStatus,

    /// Free-form notes describing the submission
    pub notes: String,

    /// URL of the uploaded report, provided by the file-storage service
    pub report_url: Option<String>,

    /// URL of the uploaded archive, provided by the file-storage service
    pub zip_url: Option<String>,

    /// Grade awarded (0..=points of the assignment)
    pub grade: Option<u32>,

    /// Teacher feedback
    pub feedback: Option<String>,

    /// When the work was turned in
    pub submitted_at: Option<Time>,

    /// When the work was graded
    pub graded_at: Option<Time>,

    /// When the work was handed back for revision
    pub returned_at: Option<Time>,

    /// Turned in after the due date
    pub is_late: bool,

    /// Whether the one allowed resubmission has been used
    pub resubmitted: bool,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl Submission {
    /// Create the implicit `Assigned` record for an issued assignment.
    pub fn issue(assignment_id: AssignmentId, submitter_id: SubmitterId, now: Time) -> Self {
        Self {
            assignment_id,
            submitter_id,
            status: SubmissionStatus::Assigned,
            notes: String::new(),
            report_url: None,
            zip_url: None,
            grade: None,
            feedback: None,
            submitted_at: None,
            graded_at: None,
            returned_at: None,
            is_late: false,
            resubmitted: false,
            created_at: now,
            updated_at: now,
        }
    }
}
