//! Soft-skill aggregation.
//!
//! Folds peer-rating events into per-dimension and overall competency
//! scores. One review per `(team, reviewer, reviewee, checkpoint)`
//! tuple, last write wins; profiles and classroom summaries are
//! recomputed from the stored reviews on every read.

#![warn(missing_docs)]

pub mod aggregator;

pub use aggregator::SoftSkillAggregator;
