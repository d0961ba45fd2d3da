//! Warmup error types
//!
//! Every way a warmup run can fail, from binding the listener to closing it.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::http::HttpError;

/// Errors reported by a warmup run
#[derive(Error, Debug)]
pub enum WarmupError {
    /// Listener failed to bind for a reason other than the port being taken
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Every probed port was already in use
    #[error("Unable to find an available warmup port after {attempts} attempts (last tried {last_port})")]
    PortExhausted { attempts: u32, last_port: u16 },

    /// A task spec could not be turned into a runnable task
    #[error("Invalid warmup task at index {index}: {reason}")]
    InvalidTaskSpec { index: usize, reason: String },

    /// A task reported its own failure (non-2xx status, transport error, user error)
    #[error("Warmup task {index} ({name}) failed: {message}")]
    TaskFailure {
        index: usize,
        name: String,
        message: String,
    },

    /// A task did not finish within its allotted time
    #[error("Warmup task timed out after {}ms: {name}", .timeout.as_millis())]
    TaskTimeout {
        index: usize,
        name: String,
        timeout: Duration,
    },

    /// Listener failed to shut down cleanly
    #[error("Failed to close the warmup listener: {0}")]
    Close(#[source] io::Error),

    /// Default HTTP client could not be built
    #[error("Failed to set up the warmup HTTP client: {0}")]
    Transport(#[from] HttpError),
}

impl WarmupError {
    /// Short stable label for log lines
    pub fn as_label(&self) -> &'static str {
        match self {
            WarmupError::Bind { .. } => "bind_error",
            WarmupError::PortExhausted { .. } => "port_exhausted",
            WarmupError::InvalidTaskSpec { .. } => "invalid_task_spec",
            WarmupError::TaskFailure { .. } => "task_failure",
            WarmupError::TaskTimeout { .. } => "task_timeout",
            WarmupError::Close(_) => "close_error",
            WarmupError::Transport(_) => "transport_error",
        }
    }

    /// Index of the task this error belongs to, if any
    pub fn task_index(&self) -> Option<usize> {
        match self {
            WarmupError::InvalidTaskSpec { index, .. }
            | WarmupError::TaskFailure { index, .. }
            | WarmupError::TaskTimeout { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WarmupError::TaskTimeout { .. })
    }

    pub(crate) fn task_failure(index: usize, name: &str, err: &anyhow::Error) -> Self {
        WarmupError::TaskFailure {
            index,
            name: name.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn invalid(index: usize, reason: impl Into<String>) -> Self {
        WarmupError::InvalidTaskSpec {
            index,
            reason: reason.into(),
        }
    }
}
