//! Warmup execution engine
//!
//! Runs canonical tasks in parallel and drives the bind/run/close lifecycle.

mod latch;
mod parallel;
mod runner;

pub use latch::CompletionLatch;
pub use parallel::{parallel_speedup, ParallelRunner};
pub use runner::{run_warmup, Completion, Phase, Warmup, WarmupResult};
