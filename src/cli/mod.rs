//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use server_warmup::WarmupOptions;

/// Warm up a server before it takes traffic
#[derive(Parser, Debug)]
#[command(name = "server-warmup")]
#[command(version)]
#[command(about = "Bind a server on a free port, hit it with warmup tasks, stop it")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a server command and run a warmup plan against it
    Run(RunArgs),

    /// Validate a warmup plan and print its tasks
    Check(CheckArgs),

    /// List the WARMUP_* environment variables
    Env,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Warmup plan (JSON or YAML); falls back to WARMUP_PLAN
    #[arg(short, long)]
    pub plan: Option<PathBuf>,

    /// Starting port; random in 10000-50000 when unset
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Default per-task timeout in milliseconds (0 disables)
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Ports to probe before giving up
    #[arg(long)]
    pub max_bind_attempts: Option<u32>,

    /// Maximum tasks in flight
    #[arg(short, long)]
    pub concurrent: Option<usize>,

    /// Host warmup requests are sent to
    #[arg(long)]
    pub host: Option<String>,

    /// Environment variable the server reads its port from
    #[arg(long, default_value = "PORT")]
    pub port_env: String,

    /// How long to wait for the server to accept connections, in milliseconds
    #[arg(long, default_value = "30000")]
    pub ready_timeout_ms: u64,

    /// Server command and its arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Layer flags on top of `options`
    pub fn apply(&self, mut options: WarmupOptions) -> WarmupOptions {
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout_ms(ms);
        }
        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        if let Some(attempts) = self.max_bind_attempts {
            options = options.with_max_bind_attempts(attempts);
        }
        if let Some(limit) = self.concurrent {
            options = options.with_max_concurrent(limit);
        }
        if let Some(host) = &self.host {
            options = options.with_host(host.clone());
        }
        options
    }
}

/// Arguments for check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Warmup plan (JSON or YAML); falls back to WARMUP_PLAN
    #[arg(short, long)]
    pub plan: Option<PathBuf>,
}
