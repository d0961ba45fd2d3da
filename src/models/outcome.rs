//! Task outcomes and run aggregation
//!
//! Defines what a single task produces and how a whole run is summarized.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::WarmupError;

/// Terminal result of one task. Recorded exactly once.
#[derive(Debug)]
pub enum TaskOutcome {
    Success,
    Failure(WarmupError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }

    pub fn error(&self) -> Option<&WarmupError> {
        match self {
            TaskOutcome::Success => None,
            TaskOutcome::Failure(err) => Some(err),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "✓",
            TaskOutcome::Failure(err) if err.is_timeout() => "○",
            TaskOutcome::Failure(_) => "✗",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "OK"),
            TaskOutcome::Failure(err) if err.is_timeout() => write!(f, "TIMEOUT"),
            TaskOutcome::Failure(_) => write!(f, "FAIL"),
        }
    }
}

/// Which failure a run reports when several tasks fail
///
/// `ByIndex` is the default: the same failing plan reports the same error on
/// every run, and it matches the order tasks are listed and reported in.
/// `ByArrival` reports whichever failure the scheduler
/// settled first, so two tasks failing close together can swap between runs.
/// Pick it when the earliest failure on the clock is what matters, e.g. to
/// see which dependency went down first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrder {
    /// Lowest task index wins
    #[default]
    ByIndex,
    /// First failure settled on the clock wins
    ByArrival,
}

/// Outcome of a single task plus bookkeeping
#[derive(Debug)]
pub struct TaskReport {
    pub index: usize,
    pub name: String,
    pub outcome: TaskOutcome,
    pub duration: Duration,
    /// Position in the order outcomes were recorded, starting at 0
    pub arrival: usize,
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Task {} ({}) {} in {}ms",
            self.outcome.symbol(),
            self.index + 1,
            self.name,
            self.outcome,
            self.duration.as_millis()
        )?;
        if let Some(err) = self.outcome.error() {
            write!(f, " - {err}")?;
        }
        Ok(())
    }
}

/// Every task's report, sorted by index
#[derive(Debug)]
pub struct RunReport {
    pub reports: Vec<TaskReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(mut reports: Vec<TaskReport>, elapsed: Duration) -> Self {
        reports.sort_by_key(|r| r.index);
        Self { reports, elapsed }
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// The report whose error the run surfaces, if any failed
    pub fn first_failure(&self, order: ErrorOrder) -> Option<&TaskReport> {
        let failures = self.reports.iter().filter(|r| !r.outcome.is_success());
        match order {
            ErrorOrder::ByIndex => failures.min_by_key(|r| r.index),
            ErrorOrder::ByArrival => failures.min_by_key(|r| r.arrival),
        }
    }

    /// Collapse into the aggregate result, consuming the reports
    pub fn into_result(self, order: ErrorOrder) -> RunResult {
        let winner = self.first_failure(order).map(|r| r.index);
        let Some(index) = winner else {
            return RunResult::AllSucceeded;
        };

        self.reports
            .into_iter()
            .find(|r| r.index == index)
            .and_then(|r| match r.outcome {
                TaskOutcome::Failure(err) => Some(RunResult::Failed(err)),
                TaskOutcome::Success => None,
            })
            .unwrap_or(RunResult::AllSucceeded)
    }
}

/// Aggregate over all task outcomes
#[derive(Debug)]
pub enum RunResult {
    AllSucceeded,
    Failed(WarmupError),
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::AllSucceeded)
    }

    pub fn into_result(self) -> Result<(), WarmupError> {
        match self {
            RunResult::AllSucceeded => Ok(()),
            RunResult::Failed(err) => Err(err),
        }
    }
}

/// What a successful warmup returns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarmupSummary {
    /// Port the listener actually bound to
    pub port: u16,
    /// Bind attempts it took to get there
    pub attempts: u32,
    pub tasks: usize,
    pub elapsed: Duration,
}

impl fmt::Display for WarmupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Warmed up {} task(s) on port {} in {}ms",
            self.tasks,
            self.port,
            self.elapsed.as_millis()
        )
    }
}
