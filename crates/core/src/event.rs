//! Classroom broadcast events.
//!
//! Each payload has the same shape the matching query endpoint
//! returns, so a client without a live subscription can always fall
//! back to polling the read path without protocol divergence. The
//! push is a notification to re-read, never an alternate data path.

use serde::{Deserialize, Serialize};

use crate::id::{ClassroomId, TeamId};
use crate::poll::{Poll, PollTally};
use crate::progression::Achievement;
use crate::project::MilestoneState;

/// An event published on a classroom-scoped channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ClassroomEvent {
    /// A poll was created and activated
    PollOpened {
        /// The newly active poll
        poll: Poll,
    },
    /// The active poll was closed
    PollClosed {
        /// The closed poll
        poll: Poll,
        /// Final per-option counts
        tallies: Vec<PollTally>,
    },
    /// A team's submission unlocked a milestone
    MilestoneUnlocked {
        /// Team that progressed
        team_id: TeamId,
        /// The milestone that became workable
        milestone: MilestoneState,
    },
    /// A team earned an achievement
    AchievementEarned {
        /// Team that earned it
        team_id: TeamId,
        /// The catalog entry earned
        achievement: Achievement,
    },
}

/// Sink for classroom events. The engine's broadcast bus implements
/// this; tests plug in a recording sink.
pub trait EventSink: Send + Sync {
    /// Publish an event on the given classroom's channel.
    fn publish(&self, classroom_id: ClassroomId, event: ClassroomEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _classroom_id: ClassroomId, _event: ClassroomEvent) {}
}
