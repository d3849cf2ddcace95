//! Unique identifiers for ClassPulse entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a Project
    ProjectId
}

entity_id! {
    /// Unique identifier for a Milestone
    MilestoneId
}

entity_id! {
    /// Unique identifier for an Assignment
    AssignmentId
}

entity_id! {
    /// Unique identifier for a Team
    TeamId
}

entity_id! {
    /// Unique identifier for a Student (owned by the roster service, referenced here)
    StudentId
}

entity_id! {
    /// Unique identifier for a Classroom (owned by the roster service, referenced here)
    ClassroomId
}

entity_id! {
    /// Unique identifier for a Poll
    PollId
}

entity_id! {
    /// Unique identifier for a Task (non-milestone XP-earning work item)
    TaskId
}

entity_id! {
    /// Identifier for the party a submission belongs to.
    ///
    /// A submission against a classroom assignment belongs to a student;
    /// a submission against a project milestone belongs to the whole team.
    /// Both share one ledger and one uniqueness tuple, so the submitter
    /// slot accepts either id.
    SubmitterId
}

impl From<StudentId> for SubmitterId {
    fn from(id: StudentId) -> Self {
        Self(id.0)
    }
}

impl From<TeamId> for SubmitterId {
    fn from(id: TeamId) -> Self {
        Self(id.0)
    }
}

// A milestone is itself the assignment its submissions are keyed by,
// so the conversion goes both ways.
impl From<MilestoneId> for AssignmentId {
    fn from(id: MilestoneId) -> Self {
        Self(id.0)
    }
}

impl From<AssignmentId> for MilestoneId {
    fn from(id: AssignmentId) -> Self {
        Self(id.0)
    }
}

/// Stable identifier for a catalog achievement (a human-readable slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AchievementId(String);

impl AchievementId {
    /// Create an achievement id from a slug.
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// The slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AchievementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
