//! Shared utilities: logging setup, log sinks and timers.

pub mod logger;
pub mod timer;

pub use logger::{
    init_logger, LineKind, LogLevel, LogSink, MemorySink, NoopSink, SinkRef, TracingSink, LOG_PREFIX,
};
pub use timer::{Stopwatch, Timer};
