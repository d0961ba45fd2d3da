//! server-warmup - pre-traffic warmup for server applications
//!
//! Starts a server command on a free port, sends it the requests listed in a
//! warmup plan, then stops it. Exits non-zero if any warmup task failed.
//!
//! ## Usage
//!
//! ```bash
//! # Warm up a node server with the tasks in warmup.yaml
//! server-warmup run --plan warmup.yaml -- node server.js
//!
//! # Fixed port, tighter timeout, at most 4 requests in flight
//! server-warmup run --plan warmup.yaml -P 15000 -t 2000 -c 4 -- ./target/release/api
//!
//! # Validate a plan without starting anything
//! server-warmup check --plan warmup.yaml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use server_warmup::config::print_env_help;
use server_warmup::task::{normalize, RunContext};
use server_warmup::{
    init_logger, EnvConfig, HttpClient, LogLevel, NoopSink, ProcessServer, TracingSink, Warmup,
    WarmupPlan, WarmupTaskSpec, PORT_RANGE,
};

mod cli;

use cli::{Args, CheckArgs, Command, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    init_logger(if verbose { LogLevel::Debug } else { LogLevel::Info });

    match args.command {
        Command::Run(run_args) => run(run_args, &env).await?,
        Command::Check(check_args) => check(check_args, &env)?,
        Command::Env => print_env_help(),
    }

    Ok(())
}

async fn run(args: RunArgs, env: &EnvConfig) -> Result<()> {
    let plan = load_plan(args.plan.as_deref(), env)?;
    let options = args.apply(env.apply(plan.options.clone()));
    let specs = plan.task_specs()?;

    let mut server = ProcessServer::from_command(&args.command)
        .context("No server command given after --")?
        .port_var(&args.port_env)
        .ready_timeout(Duration::from_millis(args.ready_timeout_ms));

    info!(
        "Warming up `{}` with {} task(s)",
        args.command.join(" "),
        specs.len()
    );

    let summary = Warmup::new(options)
        .sink(Arc::new(TracingSink))
        .run(&mut server, specs)
        .await
        .context("Warmup failed")?;

    info!("{}", summary);
    Ok(())
}

fn check(args: CheckArgs, env: &EnvConfig) -> Result<()> {
    let plan = load_plan(args.plan.as_deref(), env)?;
    let options = env.apply(plan.options.clone());
    let specs = plan.task_specs()?;

    let port = options.port.unwrap_or(*PORT_RANGE.start());
    let ctx = RunContext::new(options.host.as_str(), port);
    let paths: Vec<Option<String>> = specs
        .iter()
        .map(|spec| match spec {
            WarmupTaskSpec::Url(task) => Some(task.path.clone()),
            WarmupTaskSpec::Function(_) => None,
        })
        .collect();

    let transport = Arc::new(HttpClient::new()?);
    let tasks = normalize(specs, &ctx, options.timeout, transport, &NoopSink)?;

    println!("\nWarmup plan: {} task(s)\n", tasks.len());
    for (task, path) in tasks.iter().zip(&paths) {
        let target = path
            .as_deref()
            .map(|p| ctx.url(p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:2}. {:30} timeout={:>6}ms  {}",
            task.index() + 1,
            task.name(),
            task.timeout().as_millis(),
            target
        );
    }
    println!();
    println!("  start port:        {}", describe_port(options.port));
    println!("  max bind attempts: {}", options.max_bind_attempts);
    println!(
        "  max concurrent:    {}",
        options
            .max_concurrent
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!();

    Ok(())
}

fn load_plan(path: Option<&Path>, env: &EnvConfig) -> Result<WarmupPlan> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env.plan.as_ref().map(PathBuf::from))
        .context("No plan file given (use --plan or WARMUP_PLAN)")?;

    WarmupPlan::load(&path)
}

fn describe_port(port: Option<u16>) -> String {
    match port {
        Some(port) => port.to_string(),
        None => format!(
            "random in {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ),
    }
}
