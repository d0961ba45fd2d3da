//! Pre-traffic warmup for server applications
//!
//! A warmup run binds the application server on a free port, runs a list of
//! warmup tasks against it in parallel (HTTP requests or arbitrary async
//! functions), then closes the listener and reports one result.
//!
//! ## Lifecycle
//!
//! 1. [`PortBinder`] starts at the configured port (or a random one in
//!    10000-50000) and moves up one port per "address in use" failure.
//! 2. Task specs are normalized against the bound port. A malformed spec
//!    fails the run before anything is sent.
//! 3. [`ParallelRunner`] starts every task, each with its own timeout.
//! 4. The listener is closed exactly once, on success and failure alike.
//!
//! ## Example
//!
//! ```no_run
//! use server_warmup::{run_warmup, FunctionTask, TcpServer, WarmupOptions, WarmupTaskSpec};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut server = TcpServer::new("127.0.0.1", |listener, shutdown| async move {
//!     // Hand `listener` to your HTTP stack and stop when `shutdown` resolves.
//!     let _listener = listener;
//!     shutdown.await;
//!     Ok(())
//! });
//!
//! let summary = run_warmup(
//!     &mut server,
//!     vec![
//!         WarmupTaskSpec::path("/health"),
//!         FunctionTask::named("prime cache", |ctx| async move {
//!             println!("warming {}", ctx.url("/cache"));
//!             Ok(())
//!         })
//!         .into(),
//!     ],
//!     WarmupOptions::new().with_timeout_ms(5000),
//! )
//! .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod models;
pub mod server;
pub mod task;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{EnvConfig, WarmupOptions, WarmupPlan};
pub use error::WarmupError;
pub use executor::{run_warmup, Completion, ParallelRunner, Phase, Warmup, WarmupResult};
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, HttpTransport};
pub use models::{ErrorOrder, RunReport, RunResult, TaskOutcome, TaskReport, WarmupSummary};
pub use server::{
    FnServer, PortBinder, ProcessServer, ShutdownSignal, TcpServer, WarmupServer, PORT_RANGE,
};
pub use task::{FunctionTask, RunContext, UrlTask, WarmupTaskSpec};
pub use utils::{init_logger, LogLevel, LogSink, MemorySink, NoopSink, SinkRef, TracingSink};
