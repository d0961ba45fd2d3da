//! Logging utilities
//!
//! Subscriber setup for the binary, plus the [`LogSink`] capability that a
//! warmup run writes its progress lines to.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Prefix attached to every progress line
pub const LOG_PREFIX: &str = "[warmup]";

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize the logger with specified level
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "server_warmup={lvl},warmup={lvl}",
            lvl = level.to_tracing_level()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Destination for warmup progress lines
///
/// Lines arrive already formatted; the sink decides where they go.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Shared handle to a sink
pub type SinkRef = Arc<dyn LogSink>;

/// Discards everything. The default for library use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards lines to `tracing` under the `warmup` target
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "warmup", "{} {}", LOG_PREFIX, message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "warmup", "{} {}", LOG_PREFIX, message);
    }
}

/// Severity of a captured line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Info,
    Error,
}

/// Keeps every line in memory, prefixed
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LineKind, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, line)| line).collect()
    }

    pub fn entries(&self) -> Vec<(LineKind, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries().iter().any(|(_, line)| line.contains(text))
    }

    fn push(&self, kind: LineKind, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, format!("{LOG_PREFIX} {message}")));
    }
}

impl LogSink for MemorySink {
    fn info(&self, message: &str) {
        self.push(LineKind::Info, message);
    }

    fn error(&self, message: &str) {
        self.push(LineKind::Error, message);
    }
}
