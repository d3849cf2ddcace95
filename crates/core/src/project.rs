//! Project, milestone and team models.

use serde::{Deserialize, Serialize};

use crate::id::{ClassroomId, MilestoneId, ProjectId, TeamId};
use crate::{EngineError, EngineResult, Time};

/// A project: an ordered plan of milestones worked on by teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Classroom this project belongs to
    pub classroom_id: ClassroomId,

    /// Project title
    pub title: String,

    /// Description
    pub description: String,

    /// Ordered milestone ids (by `sequence_index`)
    pub milestones: Vec<MilestoneId>,

    /// Project deadline
    pub deadline: Option<Time>,

    /// Creation timestamp
    pub created_at: Time,
}

/// An ordered checkpoint within a project.
///
/// Immutable once a submission against it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// Unique identifier
    pub id: MilestoneId,

    /// Owning project
    pub project_id: ProjectId,

    /// Position in the project plan; unique and contiguous per project
    pub sequence_index: u32,

    /// Milestone title
    pub title: String,

    /// Description
    pub description: String,

    /// Due date, if any
    pub due_date: Option<Time>,

    /// XP awarded to the team when this milestone is graded
    pub points: u32,
}

/// A team working on a project. Membership is owned by the roster
/// service; only the ids the engine needs are kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Unique identifier
    pub id: TeamId,

    /// Project the team works on
    pub project_id: ProjectId,

    /// Team name
    pub name: String,

    /// Creation timestamp
    pub created_at: Time,
}

/// Derived unlock state for one milestone of a team's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneState {
    /// Which milestone this describes
    pub milestone_id: MilestoneId,

    /// Position in the plan
    pub sequence_index: u32,

    /// Workable: the predecessor has been submitted (or this is index 0)
    pub unlocked: bool,

    /// Submitted and waiting for the teacher's grade
    pub pending_approval: bool,

    /// Graded
    pub completed: bool,
}

/// Derived unlock picture for a team across a whole project plan.
///
/// Never authored directly; recomputed from persisted submission
/// history on every read so concurrent teacher/student actions cannot
/// leave a stale cached view behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMilestoneProgress {
    /// Team this progress belongs to
    pub team_id: TeamId,

    /// Project the plan belongs to
    pub project_id: ProjectId,

    /// Per-milestone states, ordered by `sequence_index`
    pub milestones: Vec<MilestoneState>,

    /// Highest `sequence_index` that is not locked
    pub current_index: u32,

    /// Number of completed (graded) milestones
    pub milestones_completed: u32,
}

impl TeamMilestoneProgress {
    /// Ids of currently unlocked milestones.
    pub fn unlocked_ids(&self) -> Vec<MilestoneId> {
        self.milestones
            .iter()
            .filter(|m| m.unlocked)
            .map(|m| m.milestone_id)
            .collect()
    }
}

/// Check that a milestone plan's `sequence_index` values form a
/// contiguous `0..N-1` with no duplicates.
///
/// Violating plans are rejected at creation time rather than being
/// discovered by the unlock tracker later.
pub fn validate_milestone_order(milestones: &[Milestone]) -> EngineResult<()> {
    let mut seen = vec![false; milestones.len()];
    for m in milestones {
        let idx = m.sequence_index as usize;
        if idx >= milestones.len() {
            return Err(EngineError::Validation(format!(
                "milestone {} has sequence_index {} outside 0..{}",
                m.id,
                m.sequence_index,
                milestones.len()
            )));
        }
        if seen[idx] {
            return Err(EngineError::Validation(format!(
                "duplicate sequence_index {} in project plan",
                m.sequence_index
            )));
        }
        seen[idx] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ClassroomId, ProjectId};

    fn milestone(project_id: ProjectId, index: u32) -> Milestone {
        Milestone {
            id: MilestoneId::new(),
            project_id,
            sequence_index: index,
            title: format!("Milestone {}", index + 1),
            description: String::new(),
            due_date: None,
            points: 100,
        }
    }

    #[test]
    fn contiguous_plan_is_accepted() {
        let project_id = ProjectId::new();
        let plan: Vec<_> = (0..4).map(|i| milestone(project_id, i)).collect();
        assert!(validate_milestone_order(&plan).is_ok());
    }

    #[test]
    fn gap_in_sequence_is_rejected() {
        let project_id = ProjectId::new();
        let plan = vec![milestone(project_id, 0), milestone(project_id, 2)];
        assert!(matches!(
            validate_milestone_order(&plan),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let project_id = ProjectId::new();
        let plan = vec![milestone(project_id, 0), milestone(project_id, 0)];
        assert!(matches!(
            validate_milestone_order(&plan),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn empty_plan_is_accepted() {
        assert!(validate_milestone_order(&[]).is_ok());
        let _ = ClassroomId::new();
    }
}
