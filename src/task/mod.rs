//! Warmup tasks
//!
//! Caller-facing specs ([`WarmupTaskSpec`]) are normalized once, up front,
//! into [`CanonicalTask`]s: a name, a timeout and a single callable. The
//! runner only ever sees canonical tasks.

mod canonical;
mod spec;

pub use canonical::{normalize, CanonicalTask, RunContext};
pub use spec::{FunctionTask, TaskFnRef, TaskFuture, UrlTask, WarmupTaskSpec};

/// Name given to function tasks without one
pub const ANONYMOUS: &str = "(anonymous)";
