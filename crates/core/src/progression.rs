//! Team progression: XP awards, levels and achievements.

use serde::{Deserialize, Serialize};

use crate::id::{AchievementId, MilestoneId, TaskId, TeamId};
use crate::Time;

/// What earned an XP award. Doubles as the idempotency key: a given
/// source can award XP to a team at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum XpSource {
    /// A milestone reached `graded`
    Milestone(MilestoneId),
    /// A task was completed
    Task(TaskId),
    /// Bonus XP attached to an unlocked achievement
    Achievement(AchievementId),
}

impl XpSource {
    /// Stable string key for uniqueness enforcement in the store.
    pub fn key(&self) -> String {
        match self {
            XpSource::Milestone(id) => format!("milestone-{}", id),
            XpSource::Task(id) => format!("task-{}", id),
            XpSource::Achievement(id) => format!("achievement-{}", id),
        }
    }
}

/// One append-only XP award event. Unique per `(team_id, source)`;
/// replaying a completion event fails on the uniqueness constraint
/// instead of inflating the total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpAward {
    /// Team receiving the XP
    pub team_id: TeamId,

    /// What earned it (the idempotency key)
    pub source: XpSource,

    /// Amount awarded, non-negative by construction
    pub amount: u64,

    /// Human-readable reason
    pub reason: String,

    /// When the award was recorded
    pub awarded_at: Time,
}

/// Derived progression state for a team. `total_xp` is the sum of
/// distinct awards, so it is monotonic by construction; the level is a
/// pure function of `total_xp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamProgress {
    /// Team this progress describes
    pub team_id: TeamId,

    /// Sum of all distinct XP awards
    pub total_xp: u64,

    /// Largest level whose threshold is within `total_xp`
    pub current_level: u32,

    /// XP needed to reach the next level, if one exists
    pub xp_to_next_level: Option<u64>,

    /// Achievements earned so far, in unlock order
    pub unlocked_achievements: Vec<AchievementId>,
}

/// Predicate deciding when an achievement fires. Evaluated against a
/// team's progress and submission history; newly satisfied triggers
/// are recorded exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTrigger {
    /// The team's first milestone submission was turned in
    FirstSubmission,
    /// At least this many milestones graded
    MilestonesCompleted(u32),
    /// Total XP reached this value
    TotalXp(u64),
    /// Level reached this value
    LevelReached(u32),
    /// At least this many milestones graded with on-time submissions
    OnTimeCompletions(u32),
}

/// A static catalog entry describing an earnable achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable slug identifying the achievement
    pub id: AchievementId,

    /// Display name
    pub name: String,

    /// Description shown to students
    pub description: String,

    /// Emoji or icon hint for the UI
    pub icon: String,

    /// Bonus XP granted on unlock
    pub xp_bonus: u64,

    /// When the achievement fires
    pub trigger: AchievementTrigger,
}

/// Record of a team earning an achievement. Unique per
/// `(team_id, achievement_id)`; re-evaluation is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementUnlock {
    /// Team that earned it
    pub team_id: TeamId,

    /// Which achievement
    pub achievement_id: AchievementId,

    /// When it was earned
    pub earned_at: Time,
}
