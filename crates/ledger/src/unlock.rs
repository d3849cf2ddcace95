//! Milestone unlock derivation.
//!
//! The unlock picture is a pure function of a project's ordered
//! milestone list and the team's persisted submission statuses,
//! recomputed on every read. Nothing here mutates incrementally, so
//! there is no cached state to drift from what the store holds.

use std::collections::HashMap;
use std::sync::Arc;

use classpulse_core::{
    validate_milestone_order, EngineError, EngineResult, Milestone, MilestoneId, MilestoneState,
    SubmissionStatus, Team, TeamId, TeamMilestoneProgress,
};
use classpulse_storage::Storage;
use tracing::warn;

/// Derive the unlock picture for one team.
///
/// Milestone 0 is always unlocked. Milestone `i > 0` is unlocked iff
/// the predecessor has been turned in; grading is not required to
/// start the next milestone, only submission. `Returned` keeps the
/// successor unlocked: a returned submission has necessarily been
/// turned in once, and downstream unlocks are never revoked.
///
/// Malformed ordering (a gap or duplicate in `sequence_index`) fails
/// closed: every non-zero milestone is reported locked rather than
/// guessing an order.
pub fn derive_unlocks(
    team_id: TeamId,
    milestones: &[Milestone],
    statuses: &HashMap<MilestoneId, SubmissionStatus>,
) -> TeamMilestoneProgress {
    let mut ordered: Vec<&Milestone> = milestones.iter().collect();
    ordered.sort_by_key(|m| m.sequence_index);

    let well_formed = validate_milestone_order(milestones).is_ok();
    if !well_formed {
        warn!(%team_id, "malformed milestone ordering, failing closed");
    }

    let mut states = Vec::with_capacity(ordered.len());
    for (pos, milestone) in ordered.iter().enumerate() {
        let status = statuses.get(&milestone.id).copied();
        let predecessor_submitted = pos > 0
            && matches!(
                statuses.get(&ordered[pos - 1].id),
                Some(SubmissionStatus::TurnedIn)
                    | Some(SubmissionStatus::Graded)
                    | Some(SubmissionStatus::Returned)
            );
        let unlocked = if well_formed {
            pos == 0 || predecessor_submitted
        } else {
            pos == 0
        };
        states.push(MilestoneState {
            milestone_id: milestone.id,
            sequence_index: milestone.sequence_index,
            unlocked,
            pending_approval: status == Some(SubmissionStatus::TurnedIn),
            completed: status == Some(SubmissionStatus::Graded),
        });
    }

    let current_index = states
        .iter()
        .filter(|s| s.unlocked)
        .map(|s| s.sequence_index)
        .max()
        .unwrap_or(0);
    let milestones_completed = states.iter().filter(|s| s.completed).count() as u32;
    let project_id = milestones
        .first()
        .map(|m| m.project_id)
        .unwrap_or_default();

    TeamMilestoneProgress {
        team_id,
        project_id,
        milestones: states,
        current_index,
        milestones_completed,
    }
}

/// Storage-backed tracker that recomputes a team's unlock picture
/// from persisted submission history.
pub struct MilestoneTracker<S> {
    storage: Arc<S>,
}

impl<S: Storage> MilestoneTracker<S> {
    /// Create a tracker over the given store.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Recompute the unlock picture for `team` from the store.
    pub async fn team_progress(&self, team: &Team) -> EngineResult<TeamMilestoneProgress> {
        let milestones = self.storage.list_milestones(team.project_id).await?;
        if milestones.is_empty() {
            return Err(EngineError::NotFound(format!(
                "milestones for project {}",
                team.project_id
            )));
        }

        let mut statuses = HashMap::new();
        for milestone in &milestones {
            if let Some(submission) = self
                .storage
                .load_submission(milestone.id.into(), team.id.into())
                .await?
            {
                statuses.insert(milestone.id, submission.status);
            }
        }
        Ok(derive_unlocks(team.id, &milestones, &statuses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::ProjectId;

    fn plan(count: u32) -> Vec<Milestone> {
        let project_id = ProjectId::new();
        (0..count)
            .map(|i| Milestone {
                id: MilestoneId::new(),
                project_id,
                sequence_index: i,
                title: format!("Milestone {}", i + 1),
                description: String::new(),
                due_date: None,
                points: 100,
            })
            .collect()
    }

    #[test]
    fn fresh_team_has_only_milestone_zero_unlocked() {
        let milestones = plan(2);
        let progress = derive_unlocks(TeamId::new(), &milestones, &HashMap::new());

        assert!(progress.milestones[0].unlocked);
        assert!(!progress.milestones[0].pending_approval);
        assert!(!progress.milestones[1].unlocked);
        assert_eq!(progress.current_index, 0);
    }

    #[test]
    fn turning_in_milestone_zero_unlocks_milestone_one() {
        let milestones = plan(2);
        let mut statuses = HashMap::new();
        statuses.insert(milestones[0].id, SubmissionStatus::TurnedIn);

        let progress = derive_unlocks(TeamId::new(), &milestones, &statuses);
        assert!(progress.milestones[0].pending_approval);
        assert!(!progress.milestones[0].completed);
        assert!(progress.milestones[1].unlocked);
        assert_eq!(progress.current_index, 1);
        assert_eq!(progress.milestones_completed, 0);
    }

    #[test]
    fn grading_completes_without_relocking() {
        let milestones = plan(3);
        let mut statuses = HashMap::new();
        statuses.insert(milestones[0].id, SubmissionStatus::Graded);
        statuses.insert(milestones[1].id, SubmissionStatus::TurnedIn);

        let progress = derive_unlocks(TeamId::new(), &milestones, &statuses);
        assert!(progress.milestones[0].completed);
        assert!(progress.milestones[1].pending_approval);
        assert!(progress.milestones[2].unlocked);
        assert_eq!(progress.milestones_completed, 1);
    }

    #[test]
    fn returned_submission_keeps_downstream_unlocked() {
        let milestones = plan(2);
        let mut statuses = HashMap::new();
        statuses.insert(milestones[0].id, SubmissionStatus::Returned);

        let progress = derive_unlocks(TeamId::new(), &milestones, &statuses);
        assert!(!progress.milestones[0].completed);
        assert!(progress.milestones[1].unlocked);
    }

    #[test]
    fn unlock_set_is_monotonic_across_transitions() {
        let milestones = plan(3);
        let team_id = TeamId::new();
        let sequences = [
            SubmissionStatus::TurnedIn,
            SubmissionStatus::Graded,
            SubmissionStatus::Returned,
            SubmissionStatus::TurnedIn,
        ];

        let mut statuses = HashMap::new();
        let mut prev_unlocked = 0;
        for status in sequences {
            statuses.insert(milestones[0].id, status);
            let progress = derive_unlocks(team_id, &milestones, &statuses);
            let unlocked = progress.milestones.iter().filter(|m| m.unlocked).count();
            assert!(unlocked >= prev_unlocked, "unlock set shrank");
            prev_unlocked = unlocked;
        }
    }

    #[test]
    fn gap_in_ordering_fails_closed() {
        let project_id = ProjectId::new();
        let make = |index: u32| Milestone {
            id: MilestoneId::new(),
            project_id,
            sequence_index: index,
            title: String::new(),
            description: String::new(),
            due_date: None,
            points: 100,
        };
        let milestones = vec![make(0), make(2), make(3)];
        let mut statuses = HashMap::new();
        statuses.insert(milestones[0].id, SubmissionStatus::Graded);

        let progress = derive_unlocks(TeamId::new(), &milestones, &statuses);
        assert!(progress.milestones[0].unlocked);
        assert!(progress.milestones.iter().skip(1).all(|m| !m.unlocked));
    }
}
