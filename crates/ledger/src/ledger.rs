//! Submission lifecycle service.

use std::sync::Arc;

use chrono::Utc;
use classpulse_core::{
    AssignmentId, EngineError, EngineResult, MilestoneId, Submission, SubmissionStatus,
    SubmitterId, Time,
};
use classpulse_storage::{Storage, StorageError};
use tracing::{debug, info};

/// Fields a submitter provides when turning work in.
#[derive(Debug, Clone, Default)]
pub struct WorkPayload {
    /// Free-form notes describing the submission
    pub notes: String,
    /// Report URL from the external file-storage service
    pub report_url: Option<String>,
    /// Archive URL from the external file-storage service
    pub zip_url: Option<String>,
}

/// Service owning the submission state machine.
///
/// Every transition is validated against the *persisted* prior state
/// through the store's compare-and-set primitive, never against
/// client-supplied state, so replayed or out-of-order requests cannot
/// corrupt history.
pub struct SubmissionLedger<S> {
    storage: Arc<S>,
}

impl<S: Storage> SubmissionLedger<S> {
    /// Create a ledger over the given store.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Create the implicit `assigned` record when an assignment is
    /// issued. Issuing twice is a no-op that returns the existing
    /// record.
    pub async fn issue(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> EngineResult<Submission> {
        let submission = Submission::issue(assignment_id, submitter_id, Utc::now());
        if self.storage.create_submission(&submission).await? {
            debug!(%assignment_id, %submitter_id, "submission issued");
            return Ok(submission);
        }
        self.load(assignment_id, submitter_id).await
    }

    /// Turn work in. Requires status `assigned` or `returned`; a
    /// `returned` submission may be resubmitted exactly once per
    /// teacher return.
    pub async fn submit(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        payload: WorkPayload,
    ) -> EngineResult<Submission> {
        let current = self.load(assignment_id, submitter_id).await?;
        match current.status {
            SubmissionStatus::Assigned | SubmissionStatus::Returned => {}
            other => return Err(EngineError::invalid_transition("submit", other)),
        }

        let now = Utc::now();
        let (due_date, allow_late) = self.due_policy(assignment_id).await?;
        let is_late = due_date.map_or(false, |due| now > due);
        if is_late && !allow_late {
            return Err(EngineError::Validation(format!(
                "late submissions are not accepted for assignment {}",
                assignment_id
            )));
        }

        let mut updated = current.clone();
        updated.status = SubmissionStatus::TurnedIn;
        updated.notes = payload.notes;
        updated.report_url = payload.report_url;
        updated.zip_url = payload.zip_url;
        updated.submitted_at = Some(now);
        updated.is_late = is_late;
        updated.resubmitted = current.status == SubmissionStatus::Returned;
        updated.updated_at = now;

        self.storage
            .update_submission(&updated, current.status)
            .await
            .map_err(|e| cas_error(e, "submit"))?;
        info!(%assignment_id, %submitter_id, late = is_late, "work turned in");
        Ok(updated)
    }

    /// Grade turned-in work. Requires status `turned_in`.
    pub async fn grade(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        grade: u32,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        let current = self.load(assignment_id, submitter_id).await?;
        if current.status != SubmissionStatus::TurnedIn {
            return Err(EngineError::invalid_transition("grade", current.status));
        }

        let points = self.max_points(assignment_id).await?;
        if grade > points {
            return Err(EngineError::Validation(format!(
                "grade {} exceeds the assignment's {} points",
                grade, points
            )));
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.status = SubmissionStatus::Graded;
        updated.grade = Some(grade);
        updated.feedback = feedback;
        updated.graded_at = Some(now);
        updated.updated_at = now;

        self.storage
            .update_submission(&updated, SubmissionStatus::TurnedIn)
            .await
            .map_err(|e| cas_error(e, "grade"))?;
        info!(%assignment_id, %submitter_id, grade, "submission graded");
        Ok(updated)
    }

    /// Hand graded work back for revision. Requires status `graded`;
    /// a subsequent `submit` moves it back to `turned_in`.
    pub async fn return_for_revision(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        let current = self.load(assignment_id, submitter_id).await?;
        if current.status != SubmissionStatus::Graded {
            return Err(EngineError::invalid_transition("return", current.status));
        }

        let now = Utc::now();
        let mut updated = current.clone();
        updated.status = SubmissionStatus::Returned;
        if feedback.is_some() {
            updated.feedback = feedback;
        }
        updated.returned_at = Some(now);
        updated.resubmitted = false;
        updated.updated_at = now;

        self.storage
            .update_submission(&updated, SubmissionStatus::Graded)
            .await
            .map_err(|e| cas_error(e, "return"))?;
        info!(%assignment_id, %submitter_id, "submission returned for revision");
        Ok(updated)
    }

    /// Load a submission or report `NotFoundError`.
    pub async fn load(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> EngineResult<Submission> {
        self.storage
            .load_submission(assignment_id, submitter_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "submission ({}, {})",
                    assignment_id, submitter_id
                ))
            })
    }

    // Milestones double as assignments, so the due-date policy comes
    // from whichever record the id resolves to.
    async fn due_policy(&self, assignment_id: AssignmentId) -> EngineResult<(Option<Time>, bool)> {
        if let Some(assignment) = self.storage.load_assignment(assignment_id).await? {
            return Ok((assignment.due_date, assignment.allow_late));
        }
        if let Some(milestone) = self
            .storage
            .load_milestone(MilestoneId::from(assignment_id))
            .await?
        {
            return Ok((milestone.due_date, true));
        }
        Err(EngineError::NotFound(format!(
            "assignment {}",
            assignment_id
        )))
    }

    async fn max_points(&self, assignment_id: AssignmentId) -> EngineResult<u32> {
        if let Some(assignment) = self.storage.load_assignment(assignment_id).await? {
            return Ok(assignment.points);
        }
        if let Some(milestone) = self
            .storage
            .load_milestone(MilestoneId::from(assignment_id))
            .await?
        {
            return Ok(milestone.points);
        }
        Err(EngineError::NotFound(format!(
            "assignment {}",
            assignment_id
        )))
    }
}

// A lost compare-and-set race means another request transitioned the
// submission first; surface the actual persisted state.
fn cas_error(err: StorageError, action: &'static str) -> EngineError {
    match err {
        StorageError::PreconditionFailed(actual) => EngineError::InvalidTransition {
            action,
            current: actual,
        },
        other => other.into(),
    }
}
