//! Data models for warmup runs
//!
//! Outcomes, per-task reports and the aggregate a run produces.

mod outcome;

pub use outcome::{ErrorOrder, RunReport, RunResult, TaskOutcome, TaskReport, WarmupSummary};
