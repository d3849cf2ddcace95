//! Team progression: XP accumulation, leveling and achievements.
//!
//! XP awards are append-only events keyed by what earned them, so a
//! replayed completion never inflates the total; the level is a pure
//! function of total XP over a configured threshold table.

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod ledger;

pub use catalog::default_catalog;
pub use config::{LevelCurve, ProgressionConfig};
pub use ledger::ProgressionLedger;
