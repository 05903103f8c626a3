//! Strategy runner over trading calendars.
//!
//! - DTE day selection per strategy and date
//! - Leg evaluation against loaded snapshots
//! - Per-strategy counts of fired, filtered and skipped days

pub mod runner;

pub use runner::{BacktestRunner, DayOutcome, RunResult, StrategySummary};
