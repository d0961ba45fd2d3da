//! Configuration module
//!
//! Options for a warmup run, plan files and environment overrides.

pub mod env;
mod plan;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::ErrorOrder;

pub use env::{print_env_help, EnvConfig};
pub use plan::WarmupPlan;

/// Default per-task timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default number of ports probed before giving up
pub const DEFAULT_MAX_BIND_ATTEMPTS: u32 = 20;

/// Host URL tasks are sent to
pub const DEFAULT_HOST: &str = "localhost";

/// Options for one warmup run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupOptions {
    /// Default per-task timeout; zero disables the timer
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Fixed starting port; random in [10000, 50000] when unset
    pub port: Option<u16>,

    /// Ports probed before giving up
    pub max_bind_attempts: u32,

    /// Host URL tasks are addressed to
    pub host: String,

    /// Upper bound on tasks in flight; unbounded when unset
    pub max_concurrent: Option<usize>,

    /// Abort a task's future once its timeout fires
    pub cancel_on_timeout: bool,

    /// Which failure to surface when several tasks fail
    pub error_order: ErrorOrder,
}

impl Default for WarmupOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            port: None,
            max_bind_attempts: DEFAULT_MAX_BIND_ATTEMPTS,
            host: DEFAULT_HOST.to_string(),
            max_concurrent: None,
            cancel_on_timeout: true,
            error_order: ErrorOrder::ByIndex,
        }
    }
}

impl WarmupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_ms(self, millis: u64) -> Self {
        self.with_timeout(Duration::from_millis(millis))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_max_bind_attempts(mut self, attempts: u32) -> Self {
        self.max_bind_attempts = attempts;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit);
        self
    }

    pub fn with_cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_timeout = cancel;
        self
    }

    pub fn with_error_order(mut self, order: ErrorOrder) -> Self {
        self.error_order = order;
        self
    }
}

/// `Duration` as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
