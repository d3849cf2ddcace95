//! Live classroom polls.
//!
//! One active poll per classroom, at most one response per student,
//! and tallies that are always derived from the persisted responses.

#![warn(missing_docs)]

pub mod manager;

pub use manager::PollSessionManager;
