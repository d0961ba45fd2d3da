//! Environment variable configuration
//!
//! Provides `WARMUP_*` overrides for [`WarmupOptions`].

use std::env;
use std::time::Duration;

use super::WarmupOptions;

/// Environment variable prefix
const ENV_PREFIX: &str = "WARMUP";

/// Overrides read from the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// Per-task timeout from WARMUP_TIMEOUT_MS
    pub timeout_ms: Option<u64>,
    /// Starting port from WARMUP_PORT
    pub port: Option<u16>,
    /// Bind attempts from WARMUP_MAX_BIND_ATTEMPTS
    pub max_bind_attempts: Option<u32>,
    /// Concurrency limit from WARMUP_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Target host from WARMUP_HOST
    pub host: Option<String>,
    /// Plan file from WARMUP_PLAN
    pub plan: Option<String>,
    /// Verbose from WARMUP_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary lookup, keyed by the full variable name
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));
        let parse = |name: &str| get(name).and_then(|v| v.trim().parse().ok());

        Self {
            timeout_ms: parse("TIMEOUT_MS"),
            port: get("PORT").and_then(|v| v.trim().parse().ok()),
            max_bind_attempts: get("MAX_BIND_ATTEMPTS").and_then(|v| v.trim().parse().ok()),
            max_concurrent: get("CONCURRENT").and_then(|v| v.trim().parse().ok()),
            host: get("HOST").filter(|v| !v.is_empty()),
            plan: get("PLAN").filter(|v| !v.is_empty()),
            verbose: get("VERBOSE").map(|v| parse_bool(&v)),
        }
    }

    /// Layer these overrides on top of `options`
    pub fn apply(&self, mut options: WarmupOptions) -> WarmupOptions {
        if let Some(ms) = self.timeout_ms {
            options.timeout = Duration::from_millis(ms);
        }
        if let Some(port) = self.port {
            options.port = Some(port);
        }
        if let Some(attempts) = self.max_bind_attempts {
            options.max_bind_attempts = attempts;
        }
        if let Some(limit) = self.max_concurrent {
            options.max_concurrent = Some(limit);
        }
        if let Some(host) = &self.host {
            options.host = host.clone();
        }
        options
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all WARMUP environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_TIMEOUT_MS         Default per-task timeout in ms (0 disables)");
    println!("  {ENV_PREFIX}_PORT               Starting warmup port");
    println!("  {ENV_PREFIX}_MAX_BIND_ATTEMPTS  Ports to probe before giving up");
    println!("  {ENV_PREFIX}_CONCURRENT         Maximum tasks in flight");
    println!("  {ENV_PREFIX}_HOST               Host URL tasks are sent to");
    println!("  {ENV_PREFIX}_PLAN               Path to the warmup plan");
    println!("  {ENV_PREFIX}_VERBOSE            Enable verbose output (true/false)");
}
