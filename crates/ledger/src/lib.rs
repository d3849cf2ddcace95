//! Submission ledger and milestone unlock tracking.
//!
//! The ledger owns the `assigned → turned_in → graded/returned`
//! lifecycle of one submitter's work against one assignment or
//! milestone; the unlock module derives which milestones of a project
//! plan are workable from that history.

#![warn(missing_docs)]

pub mod ledger;
pub mod unlock;

pub use ledger::{SubmissionLedger, WorkPayload};
pub use unlock::{derive_unlocks, MilestoneTracker};
