//! XP and achievement bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use classpulse_core::{
    Achievement, AchievementTrigger, AchievementUnlock, ClassroomEvent, EngineError, EngineResult,
    EventSink, SubmissionStatus, Team, TeamId, TeamProgress, XpAward, XpSource,
};
use classpulse_storage::Storage;
use tracing::{debug, info};

use crate::config::ProgressionConfig;

/// Service accumulating team XP and firing achievement unlocks.
pub struct ProgressionLedger<S> {
    storage: Arc<S>,
    events: Arc<dyn EventSink>,
    config: ProgressionConfig,
    catalog: Vec<Achievement>,
}

impl<S: Storage> ProgressionLedger<S> {
    /// Create a progression ledger over the given store.
    pub fn new(
        storage: Arc<S>,
        events: Arc<dyn EventSink>,
        config: ProgressionConfig,
        catalog: Vec<Achievement>,
    ) -> Self {
        Self {
            storage,
            events,
            config,
            catalog,
        }
    }

    /// The configured progression settings.
    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// The achievement catalog in effect.
    pub fn catalog(&self) -> &[Achievement] {
        &self.catalog
    }

    /// Append an XP award. `source` is the idempotency key: replaying
    /// the same completion event fails with `ConflictError` instead of
    /// counting twice.
    pub async fn award_xp(
        &self,
        team_id: TeamId,
        source: XpSource,
        amount: u64,
        reason: impl Into<String>,
    ) -> EngineResult<XpAward> {
        let award = XpAward {
            team_id,
            source,
            amount,
            reason: reason.into(),
            awarded_at: Utc::now(),
        };
        self.storage.insert_xp_award(&award).await?;
        info!(%team_id, amount, source = %award.source.key(), "xp awarded");
        Ok(award)
    }

    /// Current progression state, folded from distinct awards. Total
    /// XP is monotonic by construction and the level is a pure
    /// function of it.
    pub async fn progress(&self, team_id: TeamId) -> EngineResult<TeamProgress> {
        let awards = self.storage.list_xp_awards(team_id).await?;
        let total_xp: u64 = awards.iter().map(|a| a.amount).sum();
        let unlocks = self.storage.list_achievement_unlocks(team_id).await?;

        Ok(TeamProgress {
            team_id,
            total_xp,
            current_level: self.config.curve.level(total_xp),
            xp_to_next_level: self.config.curve.xp_to_next_level(total_xp),
            unlocked_achievements: unlocks.into_iter().map(|u| u.achievement_id).collect(),
        })
    }

    /// Run every catalog trigger against the team's current progress
    /// and submission history. Newly satisfied triggers are recorded
    /// exactly once; re-evaluating an already-earned achievement is a
    /// no-op and never re-fires an event or a bonus.
    pub async fn evaluate_achievements(&self, team: &Team) -> EngineResult<Vec<Achievement>> {
        let progress = self.progress(team.id).await?;
        let submissions = self.storage.list_submissions(team.id.into()).await?;

        let has_submitted = submissions.iter().any(|s| s.submitted_at.is_some());
        let completed = submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Graded)
            .count() as u32;
        let on_time_completed = submissions
            .iter()
            .filter(|s| s.status == SubmissionStatus::Graded && !s.is_late)
            .count() as u32;

        let project = self
            .storage
            .load_project(team.project_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("project {}", team.project_id)))?;

        let mut earned = Vec::new();
        for achievement in &self.catalog {
            let satisfied = match achievement.trigger {
                AchievementTrigger::FirstSubmission => has_submitted,
                AchievementTrigger::MilestonesCompleted(n) => completed >= n,
                AchievementTrigger::TotalXp(n) => progress.total_xp >= n,
                AchievementTrigger::LevelReached(n) => progress.current_level >= n,
                AchievementTrigger::OnTimeCompletions(n) => on_time_completed >= n,
            };
            if !satisfied {
                continue;
            }

            let unlock = AchievementUnlock {
                team_id: team.id,
                achievement_id: achievement.id.clone(),
                earned_at: Utc::now(),
            };
            if !self.storage.insert_achievement_unlock(&unlock).await? {
                // Already earned.
                continue;
            }
            debug!(team_id = %team.id, achievement = %achievement.id, "achievement unlocked");

            if achievement.xp_bonus > 0 {
                let bonus = self
                    .award_xp(
                        team.id,
                        XpSource::Achievement(achievement.id.clone()),
                        achievement.xp_bonus,
                        format!("Achievement: {}", achievement.name),
                    )
                    .await;
                match bonus {
                    Ok(_) => {}
                    // The bonus was already granted by an earlier,
                    // partially completed evaluation.
                    Err(EngineError::Conflict(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            self.events.publish(
                project.classroom_id,
                ClassroomEvent::AchievementEarned {
                    team_id: team.id,
                    achievement: achievement.clone(),
                },
            );
            earned.push(achievement.clone());
        }
        Ok(earned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classpulse_core::{
        AssignmentId, Milestone, MilestoneId, NullSink, Project, ProjectId, Submission,
    };
    use classpulse_storage::JsonStorage;
    use crate::catalog::default_catalog;

    async fn setup() -> (
        tempfile::TempDir,
        Arc<JsonStorage>,
        ProgressionLedger<JsonStorage>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let ledger = ProgressionLedger::new(
            storage.clone(),
            Arc::new(NullSink),
            ProgressionConfig::default(),
            default_catalog(),
        );
        (dir, storage, ledger)
    }

    async fn team_with_project(storage: &JsonStorage) -> Team {
        let project = Project {
            id: ProjectId::new(),
            classroom_id: classpulse_core::ClassroomId::new(),
            title: "Rover".to_string(),
            description: String::new(),
            milestones: Vec::new(),
            deadline: None,
            created_at: Utc::now(),
        };
        storage.save_project(&project).await.unwrap();
        let team = Team {
            id: TeamId::new(),
            project_id: project.id,
            name: "Alpha".to_string(),
            created_at: Utc::now(),
        };
        storage.save_team(&team).await.unwrap();
        team
    }

    #[tokio::test]
    async fn replayed_award_is_a_conflict_and_total_counts_distinct_awards() {
        let (_dir, _storage, ledger) = setup().await;
        let team_id = TeamId::new();
        let milestone = MilestoneId::new();

        ledger
            .award_xp(team_id, XpSource::Milestone(milestone), 250, "graded")
            .await
            .unwrap();
        let err = ledger
            .award_xp(team_id, XpSource::Milestone(milestone), 250, "graded again")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        ledger
            .award_xp(team_id, XpSource::Milestone(MilestoneId::new()), 100, "ok")
            .await
            .unwrap();

        let progress = ledger.progress(team_id).await.unwrap();
        assert_eq!(progress.total_xp, 350);
    }

    #[tokio::test]
    async fn level_follows_the_curve() {
        let (_dir, _storage, ledger) = setup().await;
        let team_id = TeamId::new();

        ledger
            .award_xp(team_id, XpSource::Milestone(MilestoneId::new()), 999, "a")
            .await
            .unwrap();
        let progress = ledger.progress(team_id).await.unwrap();
        assert_eq!(progress.current_level, 0);
        assert_eq!(progress.xp_to_next_level, Some(1));

        ledger
            .award_xp(team_id, XpSource::Milestone(MilestoneId::new()), 1, "b")
            .await
            .unwrap();
        let progress = ledger.progress(team_id).await.unwrap();
        assert_eq!(progress.current_level, 1);
    }

    #[tokio::test]
    async fn achievement_evaluation_is_idempotent() {
        let (_dir, storage, ledger) = setup().await;
        let team = team_with_project(&storage).await;

        // A turned-in milestone submission satisfies FirstSubmission.
        let milestone_id = MilestoneId::new();
        let mut submission = Submission::issue(
            AssignmentId::from(milestone_id),
            team.id.into(),
            Utc::now(),
        );
        submission.status = SubmissionStatus::TurnedIn;
        submission.submitted_at = Some(Utc::now());
        storage.create_submission(&submission).await.unwrap();
        let milestone = Milestone {
            id: milestone_id,
            project_id: team.project_id,
            sequence_index: 0,
            title: "Kickoff".to_string(),
            description: String::new(),
            due_date: None,
            points: 100,
        };
        storage.save_milestone(&milestone).await.unwrap();

        let earned = ledger.evaluate_achievements(&team).await.unwrap();
        assert!(earned.iter().any(|a| a.id.as_str() == "first-steps"));
        let progress = ledger.progress(team.id).await.unwrap();
        let xp_after_first = progress.total_xp;
        assert!(xp_after_first >= 50);

        // Second pass: nothing new fires and no bonus repeats.
        let earned = ledger.evaluate_achievements(&team).await.unwrap();
        assert!(earned.is_empty());
        let progress = ledger.progress(team.id).await.unwrap();
        assert_eq!(progress.total_xp, xp_after_first);
        assert_eq!(
            progress
                .unlocked_achievements
                .iter()
                .filter(|a| a.as_str() == "first-steps")
                .count(),
            1
        );
    }
}
