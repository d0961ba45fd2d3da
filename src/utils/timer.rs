//! Task and phase timing

use std::time::{Duration, Instant};

/// Measures one task from start to outcome
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Elapsed time since `start`, logged under the timer's label
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::debug!("{} took {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Marks the end of each lifecycle phase of a run
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    marks: Vec<(&'static str, Duration)>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: Vec::new(),
        }
    }

    pub fn lap(&mut self, phase: &'static str) {
        self.marks.push((phase, self.start.elapsed()));
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }

    /// Per-phase breakdown, e.g. `bind=3ms tasks=412ms close=1ms total=416ms`
    pub fn format(&self) -> String {
        let mut line = String::new();
        let mut prev = Duration::ZERO;
        for (phase, mark) in &self.marks {
            line.push_str(&format!("{}={}ms ", phase, mark.saturating_sub(prev).as_millis()));
            prev = *mark;
        }
        line.push_str(&format!("total={}ms", self.total().as_millis()));
        line
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}
