//! Storage trait abstraction.

use async_trait::async_trait;
use classpulse_core::{
    AchievementUnlock, Assignment, AssignmentId, ClassroomId, EngineError, Milestone, MilestoneId,
    PeerReview, Poll, PollId, PollResponse, Project, ProjectId, StudentId, Submission,
    SubmissionStatus, SubmitterId, Team, TeamId, Time, XpAward,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A uniqueness constraint rejected the write; the first writer
    /// already succeeded.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A conditional update found a different persisted state than the
    /// caller expected. Carries the actual state.
    #[error("precondition failed: current state is {0}")]
    PreconditionFailed(String),

    /// Item not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(s) => EngineError::Conflict(s),
            // A lost compare-and-set race is a conflict unless the
            // caller translates it into a richer InvalidTransition.
            StorageError::PreconditionFailed(s) => EngineError::Conflict(s),
            StorageError::NotFound(s) => EngineError::NotFound(s),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction for engine state.
///
/// Uniqueness and compare-and-set live here, in the backend, because
/// multiple stateless engine instances may share one store: a
/// pre-check-then-write in the service layer would be race-prone.
/// First-write-wins inserts (`insert_poll_response`) and
/// last-write-wins upserts (`upsert_review`) are deliberately distinct
/// operations, never one generic save.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Projects & milestones ===

    /// Save a project (create or update).
    async fn save_project(&self, project: &Project) -> Result<()>;

    /// Load a project by ID.
    async fn load_project(&self, id: ProjectId) -> Result<Option<Project>>;

    /// List projects in a classroom.
    async fn list_projects(&self, classroom_id: ClassroomId) -> Result<Vec<Project>>;

    /// Save a milestone (create or update).
    async fn save_milestone(&self, milestone: &Milestone) -> Result<()>;

    /// Load a milestone by ID.
    async fn load_milestone(&self, id: MilestoneId) -> Result<Option<Milestone>>;

    /// List a project's milestones, ordered by `sequence_index`.
    async fn list_milestones(&self, project_id: ProjectId) -> Result<Vec<Milestone>>;

    // === Teams ===

    /// Save a team.
    async fn save_team(&self, team: &Team) -> Result<()>;

    /// Load a team by ID.
    async fn load_team(&self, id: TeamId) -> Result<Option<Team>>;

    /// List teams on a project.
    async fn list_teams(&self, project_id: ProjectId) -> Result<Vec<Team>>;

    // === Assignments ===

    /// Save an assignment.
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;

    /// Load an assignment by ID.
    async fn load_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>>;

    // === Submissions ===

    /// Create the implicit `assigned` record for an issued assignment.
    /// Returns `false` without touching anything when the unique
    /// `(assignment_id, submitter_id)` record already exists.
    async fn create_submission(&self, submission: &Submission) -> Result<bool>;

    /// Load a submission by its unique key.
    async fn load_submission(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> Result<Option<Submission>>;

    /// Persist a transition, but only if the stored status still equals
    /// `expected`. Fails with `PreconditionFailed` (carrying the actual
    /// status) otherwise, so replayed or out-of-order requests cannot
    /// corrupt history.
    async fn update_submission(
        &self,
        submission: &Submission,
        expected: SubmissionStatus,
    ) -> Result<()>;

    /// List all submissions by one submitter.
    async fn list_submissions(&self, submitter_id: SubmitterId) -> Result<Vec<Submission>>;

    // === Peer reviews ===

    /// Upsert a review by its `(team, reviewer, reviewee, review_type)`
    /// tuple: last write wins, replacing any prior review for the same
    /// checkpoint.
    async fn upsert_review(&self, review: &PeerReview) -> Result<()>;

    /// List reviews received by a student, optionally scoped to a team.
    async fn list_reviews_for_reviewee(
        &self,
        reviewee_id: StudentId,
        team_id: Option<TeamId>,
    ) -> Result<Vec<PeerReview>>;

    /// List all reviews within a team.
    async fn list_reviews_for_team(&self, team_id: TeamId) -> Result<Vec<PeerReview>>;

    // === XP awards ===

    /// Append an XP award. The `(team_id, source)` key is unique;
    /// replayed completion events fail with `AlreadyExists`.
    async fn insert_xp_award(&self, award: &XpAward) -> Result<()>;

    /// List all awards for a team.
    async fn list_xp_awards(&self, team_id: TeamId) -> Result<Vec<XpAward>>;

    // === Achievement unlocks ===

    /// Record an achievement unlock. Returns `false` when the team has
    /// already earned it (idempotent no-op).
    async fn insert_achievement_unlock(&self, unlock: &AchievementUnlock) -> Result<bool>;

    /// List a team's unlocks, in earn order.
    async fn list_achievement_unlocks(&self, team_id: TeamId) -> Result<Vec<AchievementUnlock>>;

    // === Polls ===

    /// Persist a new poll and mark it active, but only if no other
    /// active poll exists for its classroom. Fails with
    /// `AlreadyExists` otherwise.
    async fn activate_poll(&self, poll: &Poll) -> Result<()>;

    /// Load a poll by ID.
    async fn load_poll(&self, id: PollId) -> Result<Option<Poll>>;

    /// The classroom's currently active poll, if any.
    async fn active_poll(&self, classroom_id: ClassroomId) -> Result<Option<Poll>>;

    /// Transition a poll from active to closed. Fails with
    /// `PreconditionFailed` when the poll is already closed. Returns
    /// the closed poll.
    async fn close_poll(&self, id: PollId, closed_at: Time) -> Result<Poll>;

    /// Record a response, but only while the poll is active: a respond
    /// racing a concurrent close must not land in a closed poll, so
    /// the activity check happens here, atomically with the insert,
    /// and a closed poll fails with `PreconditionFailed`. The
    /// `(poll_id, student_id)` key is unique; a second attempt fails
    /// with `AlreadyExists` and the stored response is left untouched.
    async fn insert_poll_response(&self, response: &PollResponse) -> Result<()>;

    /// List all responses to a poll.
    async fn list_poll_responses(&self, poll_id: PollId) -> Result<Vec<PollResponse>>;
}
