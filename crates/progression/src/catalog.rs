//! The built-in achievement catalog.

use classpulse_core::{Achievement, AchievementId, AchievementTrigger};

/// The default catalog. Deployments can replace it with their own
/// list; triggers are data, so no code changes are needed to tune it.
pub fn default_catalog() -> Vec<Achievement> {
    vec![
        Achievement {
            id: AchievementId::new("first-steps"),
            name: "First Steps".to_string(),
            description: "Turn in your team's first milestone submission".to_string(),
            icon: "🚀".to_string(),
            xp_bonus: 50,
            trigger: AchievementTrigger::FirstSubmission,
        },
        Achievement {
            id: AchievementId::new("first-milestone"),
            name: "Milestone Reached".to_string(),
            description: "Get a milestone graded".to_string(),
            icon: "✅".to_string(),
            xp_bonus: 100,
            trigger: AchievementTrigger::MilestonesCompleted(1),
        },
        Achievement {
            id: AchievementId::new("milestone-master"),
            name: "Milestone Master".to_string(),
            description: "Get five milestones graded".to_string(),
            icon: "🏆".to_string(),
            xp_bonus: 200,
            trigger: AchievementTrigger::MilestonesCompleted(5),
        },
        Achievement {
            id: AchievementId::new("point-collector"),
            name: "Point Collector".to_string(),
            description: "Accumulate 1000 XP".to_string(),
            icon: "⚡".to_string(),
            xp_bonus: 100,
            trigger: AchievementTrigger::TotalXp(1000),
        },
        Achievement {
            id: AchievementId::new("deadline-crusher"),
            name: "Deadline Crusher".to_string(),
            description: "Complete three milestones with on-time submissions".to_string(),
            icon: "⏰".to_string(),
            xp_bonus: 150,
            trigger: AchievementTrigger::OnTimeCompletions(3),
        },
        Achievement {
            id: AchievementId::new("rising-team"),
            name: "Rising Team".to_string(),
            description: "Reach level 3".to_string(),
            icon: "📈".to_string(),
            xp_bonus: 150,
            trigger: AchievementTrigger::LevelReached(3),
        },
    ]
}
