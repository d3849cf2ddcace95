//! The classroom progress engine facade.
//!
//! One type, [`ProgressEngine`], wires the submission ledger, milestone
//! tracker, soft-skill aggregator, progression ledger and poll manager
//! over a shared store and a per-classroom broadcast bus.

#![warn(missing_docs)]

pub mod api;
pub mod engine;
pub mod events;

pub use api::{ErrorBody, MilestonePlan};
pub use engine::ProgressEngine;
pub use events::ClassroomBus;

pub use classpulse_ledger::WorkPayload;
pub use classpulse_progression::{default_catalog, LevelCurve, ProgressionConfig};
