//! ClassPulse core data models.
//!
//! This crate defines the entities and error taxonomy shared by the
//! learning-progress engine: projects and milestones, submissions,
//! peer reviews, team progression, and live polls.

#![warn(missing_docs)]

// Core identities
mod id;

// Errors
mod error;

// Projects, milestones and teams
mod project;

// Submission lifecycle
mod submission;

// Peer reviews and soft skills
mod review;

// Team progression (XP, levels, achievements)
mod progression;

// Live polls
mod poll;

// Classroom broadcast events
mod event;

// Re-exports
pub use id::*;

pub use error::{EngineError, EngineResult};

pub use project::{
    Milestone, MilestoneState, Project, Team, TeamMilestoneProgress, validate_milestone_order,
};

pub use submission::{Assignment, Submission, SubmissionStatus};

pub use review::{
    ClassroomSkillSummary, PeerReview, ReviewType, Skill, SkillDimension, SoftSkillProfile,
};

pub use progression::{
    Achievement, AchievementTrigger, AchievementUnlock, TeamProgress, XpAward, XpSource,
};

pub use poll::{Poll, PollResponse, PollResults, PollTally};

pub use event::{ClassroomEvent, EventSink, NullSink};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
