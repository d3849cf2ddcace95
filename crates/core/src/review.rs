//! Peer review and soft-skill models.
//!
//! Ratings live on a canonical 1..5 scale everywhere inside the
//! engine; the 0..100 presentation scale exists only behind the
//! explicit `as_percent` helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{ClassroomId, StudentId, TeamId};
use crate::Time;

/// One of the four soft-skill categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillDimension {
    /// Communication, support, trust, listening
    TeamDynamics,
    /// Roles, scheduling, decisions, conflict resolution
    TeamStructure,
    /// Purpose, goals, passion, synergy
    TeamMotivation,
    /// Growth mindset, quality, self-monitoring, reflection
    TeamExcellence,
}

impl SkillDimension {
    /// All dimensions, in display order.
    pub const ALL: [SkillDimension; 4] = [
        SkillDimension::TeamDynamics,
        SkillDimension::TeamStructure,
        SkillDimension::TeamMotivation,
        SkillDimension::TeamExcellence,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            SkillDimension::TeamDynamics => "Team Dynamics",
            SkillDimension::TeamStructure => "Team Structure",
            SkillDimension::TeamMotivation => "Team Motivation",
            SkillDimension::TeamExcellence => "Team Excellence",
        }
    }
}

/// A rated skill. Each skill belongs to exactly one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Skill {
    // Team Dynamics
    Communication,
    MutualSupport,
    Trust,
    ActiveListening,
    // Team Structure
    ClearRoles,
    TaskScheduling,
    DecisionMaking,
    ConflictResolution,
    // Team Motivation
    ClearPurpose,
    SmartGoals,
    Passion,
    Synergy,
    // Team Excellence
    GrowthMindset,
    QualityWork,
    SelfMonitoring,
    ReflectivePractice,
}

impl Skill {
    /// The dimension this skill is rated under.
    pub fn dimension(&self) -> SkillDimension {
        use Skill::*;
        match self {
            Communication | MutualSupport | Trust | ActiveListening => {
                SkillDimension::TeamDynamics
            }
            ClearRoles | TaskScheduling | DecisionMaking | ConflictResolution => {
                SkillDimension::TeamStructure
            }
            ClearPurpose | SmartGoals | Passion | Synergy => SkillDimension::TeamMotivation,
            GrowthMindset | QualityWork | SelfMonitoring | ReflectivePractice => {
                SkillDimension::TeamExcellence
            }
        }
    }
}

/// Which checkpoint a review belongs to. One review per
/// `(team, reviewer, reviewee, review_type)` tuple; a repeat
/// submission for the same checkpoint replaces the prior one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    /// Mid-project peer checkpoint
    MidProject,
    /// End-of-project peer checkpoint
    Final,
    /// Student rating themselves
    SelfAssessment,
    /// Teacher rating a student
    TeacherAssessment,
}

impl ReviewType {
    /// String form used in stored record keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::MidProject => "mid_project",
            ReviewType::Final => "final",
            ReviewType::SelfAssessment => "self_assessment",
            ReviewType::TeacherAssessment => "teacher_assessment",
        }
    }
}

impl std::fmt::Display for ReviewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rater's assessment of one teammate at one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReview {
    /// Team the review happened in
    pub team_id: TeamId,

    /// Who rated
    pub reviewer_id: StudentId,

    /// Who was rated
    pub reviewee_id: StudentId,

    /// Which checkpoint
    pub review_type: ReviewType,

    /// Skill → rating, each in 1..=5
    pub ratings: BTreeMap<Skill, u8>,

    /// Optional free-form comments
    pub comments: Option<String>,

    /// When the (latest) version was submitted
    pub submitted_at: Time,
}

/// Aggregated soft-skill picture for one student. Only produced when
/// at least one review exists; zero reviews is "no data", never a
/// score of zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftSkillProfile {
    /// The student the profile describes
    pub student_id: StudentId,

    /// Per-dimension mean rating on the 1..5 scale
    pub dimension_averages: BTreeMap<SkillDimension, f64>,

    /// Mean of the dimension averages, 1..5 scale
    pub overall: f64,

    /// How many distinct reviews contributed
    pub review_count: usize,
}

impl SoftSkillProfile {
    /// Overall score converted to the 0..100 presentation scale.
    pub fn overall_as_percent(&self) -> f64 {
        self.overall * 20.0
    }

    /// Dimension average converted to the 0..100 presentation scale.
    pub fn dimension_as_percent(&self, dimension: SkillDimension) -> Option<f64> {
        self.dimension_averages.get(&dimension).map(|v| v * 20.0)
    }
}

/// Per-dimension class averages: the mean of all students'
/// per-dimension averages, unweighted by review count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassroomSkillSummary {
    /// The classroom summarized
    pub classroom_id: ClassroomId,

    /// Per-dimension mean of student means, 1..5 scale
    pub dimension_averages: BTreeMap<SkillDimension, f64>,

    /// Students with at least one review
    pub student_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_skill_maps_to_one_dimension() {
        use Skill::*;
        let skills = [
            Communication,
            MutualSupport,
            Trust,
            ActiveListening,
            ClearRoles,
            TaskScheduling,
            DecisionMaking,
            ConflictResolution,
            ClearPurpose,
            SmartGoals,
            Passion,
            Synergy,
            GrowthMindset,
            QualityWork,
            SelfMonitoring,
            ReflectivePractice,
        ];
        for dim in SkillDimension::ALL {
            let count = skills.iter().filter(|s| s.dimension() == dim).count();
            assert_eq!(count, 4, "{:?} should own 4 skills", dim);
        }
    }

    #[test]
    fn percent_conversion_is_presentation_only() {
        let mut averages = BTreeMap::new();
        averages.insert(SkillDimension::TeamDynamics, 3.5);
        let profile = SoftSkillProfile {
            student_id: StudentId::new(),
            dimension_averages: averages,
            overall: 3.5,
            review_count: 2,
        };
        assert_eq!(profile.overall, 3.5);
        assert_eq!(profile.overall_as_percent(), 70.0);
        assert_eq!(
            profile.dimension_as_percent(SkillDimension::TeamDynamics),
            Some(70.0)
        );
        assert_eq!(
            profile.dimension_as_percent(SkillDimension::TeamExcellence),
            None
        );
    }
}
