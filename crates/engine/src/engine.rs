//! The engine facade.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use classpulse_core::{
    validate_milestone_order, Achievement, Assignment, AssignmentId, ClassroomEvent,
    ClassroomId, ClassroomSkillSummary, EngineError, EngineResult, EventSink, Milestone,
    MilestoneId, PeerReview, Poll, PollId, PollResults, Project, ProjectId, ReviewType, Skill,
    SoftSkillProfile, StudentId, Submission, SubmitterId, Team, TeamId, TeamMilestoneProgress,
    TeamProgress, TaskId, Time, XpSource,
};
use classpulse_ledger::{MilestoneTracker, SubmissionLedger, WorkPayload};
use classpulse_polls::PollSessionManager;
use classpulse_progression::{default_catalog, ProgressionConfig, ProgressionLedger};
use classpulse_skills::SoftSkillAggregator;
use classpulse_storage::Storage;
use tokio::sync::broadcast;
use tracing::info;

use crate::api::MilestonePlan;
use crate::events::ClassroomBus;

/// One engine instance over one store.
///
/// The engine is stateless between calls: everything it returns is
/// recomputed from the store, and several instances may safely share a
/// backend. Events go out on a per-classroom broadcast bus.
pub struct ProgressEngine<S> {
    storage: Arc<S>,
    bus: Arc<ClassroomBus>,
    submissions: SubmissionLedger<S>,
    tracker: MilestoneTracker<S>,
    skills: SoftSkillAggregator<S>,
    progression: ProgressionLedger<S>,
    polls: PollSessionManager<S>,
}

impl<S: Storage> ProgressEngine<S> {
    /// Create an engine with the default progression settings and
    /// achievement catalog.
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_progression(storage, ProgressionConfig::default(), default_catalog())
    }

    /// Create an engine with a custom level curve and catalog.
    pub fn with_progression(
        storage: Arc<S>,
        config: ProgressionConfig,
        catalog: Vec<Achievement>,
    ) -> Self {
        let bus = Arc::new(ClassroomBus::new());
        let sink: Arc<dyn EventSink> = bus.clone();
        Self {
            submissions: SubmissionLedger::new(storage.clone()),
            tracker: MilestoneTracker::new(storage.clone()),
            skills: SoftSkillAggregator::new(storage.clone()),
            progression: ProgressionLedger::new(storage.clone(), sink.clone(), config, catalog),
            polls: PollSessionManager::new(storage.clone(), sink),
            bus,
            storage,
        }
    }

    /// Subscribe to one classroom's event stream.
    pub fn subscribe(&self, classroom_id: ClassroomId) -> broadcast::Receiver<ClassroomEvent> {
        self.bus.subscribe(classroom_id)
    }

    // === Projects, milestones, teams ===

    /// Create a project with its ordered milestone plan. The plan must
    /// name at least one milestone; sequence indices are assigned here,
    /// so the ordering invariant holds by construction.
    pub async fn create_project(
        &self,
        classroom_id: ClassroomId,
        title: impl Into<String>,
        description: impl Into<String>,
        deadline: Option<Time>,
        plan: Vec<MilestonePlan>,
    ) -> EngineResult<(Project, Vec<Milestone>)> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(EngineError::Validation("project title is empty".into()));
        }
        if plan.is_empty() {
            return Err(EngineError::Validation(
                "a project needs at least one milestone".into(),
            ));
        }

        let project_id = ProjectId::new();
        let milestones: Vec<Milestone> = plan
            .into_iter()
            .enumerate()
            .map(|(i, m)| Milestone {
                id: MilestoneId::new(),
                project_id,
                sequence_index: i as u32,
                title: m.title,
                description: m.description,
                due_date: m.due_date,
                points: m.points.unwrap_or(100),
            })
            .collect();
        validate_milestone_order(&milestones)?;

        let project = Project {
            id: project_id,
            classroom_id,
            title,
            description: description.into(),
            milestones: milestones.iter().map(|m| m.id).collect(),
            deadline,
            created_at: Utc::now(),
        };
        self.storage.save_project(&project).await?;
        for milestone in &milestones {
            self.storage.save_milestone(milestone).await?;
        }
        info!(%project_id, %classroom_id, milestones = milestones.len(), "project created");
        Ok((project, milestones))
    }

    /// Register a team on a project.
    pub async fn create_team(
        &self,
        project_id: ProjectId,
        name: impl Into<String>,
    ) -> EngineResult<Team> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::Validation("team name is empty".into()));
        }
        if self.storage.load_project(project_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("project {project_id}")));
        }
        let team = Team {
            id: TeamId::new(),
            project_id,
            name,
            created_at: Utc::now(),
        };
        self.storage.save_team(&team).await?;
        Ok(team)
    }

    /// Create a standalone assignment in a classroom.
    pub async fn create_assignment(
        &self,
        classroom_id: ClassroomId,
        title: impl Into<String>,
        due_date: Option<Time>,
        points: u32,
        allow_late: bool,
    ) -> EngineResult<Assignment> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(EngineError::Validation("assignment title is empty".into()));
        }
        let assignment = Assignment {
            id: AssignmentId::new(),
            classroom_id,
            title,
            due_date,
            points,
            allow_late,
            created_at: Utc::now(),
        };
        self.storage.save_assignment(&assignment).await?;
        Ok(assignment)
    }

    // === Submission ledger ===

    /// Issue an assignment to a submitter, creating the `assigned`
    /// record. Idempotent.
    pub async fn issue(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> EngineResult<Submission> {
        self.submissions.issue(assignment_id, submitter_id).await
    }

    /// Turn in work for a standalone assignment.
    pub async fn submit_work(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        payload: WorkPayload,
    ) -> EngineResult<Submission> {
        self.submissions
            .submit(assignment_id, submitter_id, payload)
            .await
    }

    /// Grade turned-in work for a standalone assignment.
    pub async fn grade_work(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        grade: u32,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        self.submissions
            .grade(assignment_id, submitter_id, grade, feedback)
            .await
    }

    /// Return graded work for revision.
    pub async fn return_work(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        self.submissions
            .return_for_revision(assignment_id, submitter_id, feedback)
            .await
    }

    /// Load one submission record.
    pub async fn submission(
        &self,
        assignment_id: AssignmentId,
        submitter_id: SubmitterId,
    ) -> EngineResult<Submission> {
        self.submissions.load(assignment_id, submitter_id).await
    }

    // === Milestone workflow ===

    /// Turn in a team's work on a milestone. Issues the record if
    /// needed, rejects submissions against locked milestones, then
    /// republishes the unlock picture: any milestone that became
    /// workable fires a `MilestoneUnlocked` event.
    pub async fn submit_milestone(
        &self,
        team_id: TeamId,
        milestone_id: MilestoneId,
        payload: WorkPayload,
    ) -> EngineResult<TeamMilestoneProgress> {
        let team = self.load_team(team_id).await?;
        let before = self.tracker.team_progress(&team).await?;
        let was_unlocked = before
            .milestones
            .iter()
            .find(|m| m.milestone_id == milestone_id)
            .map(|m| m.unlocked)
            .ok_or_else(|| EngineError::NotFound(format!("milestone {milestone_id}")))?;
        if !was_unlocked {
            return Err(EngineError::invalid_transition("submit", "locked"));
        }

        self.submissions
            .issue(milestone_id.into(), team_id.into())
            .await?;
        self.submissions
            .submit(milestone_id.into(), team_id.into(), payload)
            .await?;

        let after = self.tracker.team_progress(&team).await?;
        let previously: HashSet<MilestoneId> = before
            .milestones
            .iter()
            .filter(|m| m.unlocked)
            .map(|m| m.milestone_id)
            .collect();
        let classroom_id = self.classroom_of(&team).await?;
        for state in after.milestones.iter().filter(|m| m.unlocked) {
            if !previously.contains(&state.milestone_id) {
                self.bus.publish(
                    classroom_id,
                    ClassroomEvent::MilestoneUnlocked {
                        team_id,
                        milestone: state.clone(),
                    },
                );
            }
        }

        self.progression.evaluate_achievements(&team).await?;
        Ok(after)
    }

    /// Grade a team's milestone submission. A newly graded milestone
    /// awards its points as XP exactly once; a re-grade after a return
    /// never awards again.
    pub async fn grade_milestone(
        &self,
        team_id: TeamId,
        milestone_id: MilestoneId,
        grade: u32,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        let team = self.load_team(team_id).await?;
        let submission = self
            .submissions
            .grade(milestone_id.into(), team_id.into(), grade, feedback)
            .await?;

        let milestone = self
            .storage
            .load_milestone(milestone_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("milestone {milestone_id}")))?;
        let amount = if milestone.points > 0 {
            u64::from(milestone.points)
        } else {
            self.progression.config().default_milestone_xp
        };
        match self
            .progression
            .award_xp(
                team_id,
                XpSource::Milestone(milestone_id),
                amount,
                format!("Milestone graded: {}", milestone.title),
            )
            .await
        {
            Ok(_) | Err(EngineError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }

        self.progression.evaluate_achievements(&team).await?;
        Ok(submission)
    }

    /// Return a team's graded milestone for revision.
    pub async fn return_milestone(
        &self,
        team_id: TeamId,
        milestone_id: MilestoneId,
        feedback: Option<String>,
    ) -> EngineResult<Submission> {
        self.submissions
            .return_for_revision(milestone_id.into(), team_id.into(), feedback)
            .await
    }

    /// The team's current unlock picture, recomputed from the store.
    pub async fn milestone_progress(&self, team_id: TeamId) -> EngineResult<TeamMilestoneProgress> {
        let team = self.load_team(team_id).await?;
        self.tracker.team_progress(&team).await
    }

    // === Progression ===

    /// Record a completed task, awarding the configured task XP once
    /// per task.
    pub async fn complete_task(
        &self,
        team_id: TeamId,
        task_id: TaskId,
        reason: impl Into<String>,
    ) -> EngineResult<TeamProgress> {
        let team = self.load_team(team_id).await?;
        self.progression
            .award_xp(
                team_id,
                XpSource::Task(task_id),
                self.progression.config().task_xp,
                reason,
            )
            .await?;
        self.progression.evaluate_achievements(&team).await?;
        self.progression.progress(team_id).await
    }

    /// The team's XP, level and earned achievements.
    pub async fn team_progress(&self, team_id: TeamId) -> EngineResult<TeamProgress> {
        self.progression.progress(team_id).await
    }

    // === Soft skills ===

    /// Record a peer review for a checkpoint. Re-submitting the same
    /// checkpoint replaces the prior review.
    pub async fn submit_review(
        &self,
        team_id: TeamId,
        reviewer_id: StudentId,
        reviewee_id: StudentId,
        review_type: ReviewType,
        ratings: BTreeMap<Skill, u8>,
        comments: Option<String>,
    ) -> EngineResult<PeerReview> {
        self.skills
            .submit_review(team_id, reviewer_id, reviewee_id, review_type, ratings, comments)
            .await
    }

    /// A student's aggregated soft-skill profile, `None` before any
    /// review exists.
    pub async fn skill_profile(
        &self,
        student_id: StudentId,
        team_id: Option<TeamId>,
    ) -> EngineResult<Option<SoftSkillProfile>> {
        self.skills.profile(student_id, team_id).await
    }

    /// Classroom-wide dimension averages, each student weighted
    /// equally.
    pub async fn classroom_skill_summary(
        &self,
        classroom_id: ClassroomId,
    ) -> EngineResult<ClassroomSkillSummary> {
        self.skills.classroom_summary(classroom_id).await
    }

    // === Polls ===

    /// Open a poll in a classroom. Fails when one is already active.
    pub async fn open_poll(
        &self,
        classroom_id: ClassroomId,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> EngineResult<Poll> {
        self.polls.open(classroom_id, question, options).await
    }

    /// Record a student's answer; the first answer wins.
    pub async fn respond_to_poll(
        &self,
        poll_id: PollId,
        student_id: StudentId,
        option: impl Into<String>,
    ) -> EngineResult<()> {
        self.polls.respond(poll_id, student_id, option).await?;
        Ok(())
    }

    /// Close a poll and broadcast its final tallies.
    pub async fn close_poll(&self, poll_id: PollId) -> EngineResult<PollResults> {
        self.polls.close(poll_id).await
    }

    /// The classroom's active poll, if any.
    pub async fn active_poll(&self, classroom_id: ClassroomId) -> EngineResult<Option<Poll>> {
        self.polls.active(classroom_id).await
    }

    /// Current tallies for a poll.
    pub async fn poll_results(&self, poll_id: PollId) -> EngineResult<PollResults> {
        self.polls.results(poll_id).await
    }

    // === Helpers ===

    async fn load_team(&self, team_id: TeamId) -> EngineResult<Team> {
        self.storage
            .load_team(team_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("team {team_id}")))
    }

    async fn classroom_of(&self, team: &Team) -> EngineResult<ClassroomId> {
        Ok(self
            .storage
            .load_project(team.project_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("project {}", team.project_id)))?
            .classroom_id)
    }
}
