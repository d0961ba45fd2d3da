//! Warmup orchestration
//!
//! Binds the server, normalizes the tasks against the bound port, runs them
//! in parallel and closes the listener again before reporting one result.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parallel::{parallel_speedup, ParallelRunner};
use crate::config::WarmupOptions;
use crate::error::WarmupError;
use crate::http::{HttpClient, HttpTransport};
use crate::models::WarmupSummary;
use crate::server::{Bound, PortBinder, WarmupServer};
use crate::task::{normalize, RunContext, WarmupTaskSpec};
use crate::utils::{NoopSink, SinkRef, Stopwatch};

/// Result handed to the caller and the completion hook
pub type WarmupResult = Result<WarmupSummary, WarmupError>;

type CompletionHook = Box<dyn FnOnce(&WarmupResult) + Send>;

/// How a finished run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failed,
}

/// Lifecycle of one warmup run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Binding,
    Running,
    Closing,
    Done(Completion),
}

impl Phase {
    fn advance(&mut self, next: Phase) {
        debug!("Warmup phase {} -> {}", self, next);
        *self = next;
    }

    /// Enter `Done`, logging the error a failed run ends with
    fn finish(&mut self, result: &WarmupResult) {
        match result {
            Ok(summary) => {
                debug!("{}", summary);
                self.advance(Phase::Done(Completion::Success));
            }
            Err(err) => {
                debug!("Warmup failed ({}): {}", err.as_label(), err);
                self.advance(Phase::Done(Completion::Failed));
            }
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Binding => "binding",
            Phase::Running => "running",
            Phase::Closing => "closing",
            Phase::Done(Completion::Success) => "done (success)",
            Phase::Done(Completion::Failed) => "done (failed)",
        };
        f.write_str(name)
    }
}

/// Owns the bound listener until it is closed
///
/// `close` hands the listener back to the server at most once; later calls
/// are no-ops.
struct ListenerGuard<'a, S: WarmupServer> {
    server: &'a mut S,
    listener: Option<S::Listener>,
    port: u16,
}

impl<'a, S: WarmupServer> ListenerGuard<'a, S> {
    fn new(server: &'a mut S, listener: S::Listener, port: u16) -> Self {
        Self {
            server,
            listener: Some(listener),
            port,
        }
    }

    async fn close(&mut self) -> Result<(), WarmupError> {
        match self.listener.take() {
            Some(listener) => self.server.close(listener).await.map_err(WarmupError::Close),
            None => Ok(()),
        }
    }
}

impl<S: WarmupServer> Drop for ListenerGuard<'_, S> {
    fn drop(&mut self) {
        if self.listener.is_some() {
            warn!("Listener on port {} dropped without being closed", self.port);
        }
    }
}

/// Configures and runs a warmup
///
/// ```no_run
/// # async fn demo(server: &mut impl server_warmup::WarmupServer) {
/// use server_warmup::{Warmup, WarmupOptions};
///
/// let summary = Warmup::new(WarmupOptions::new().with_timeout_ms(5000))
///     .run(server, ["/health", "/search?q=warm"])
///     .await;
/// # }
/// ```
pub struct Warmup {
    options: WarmupOptions,
    transport: Option<Arc<dyn HttpTransport>>,
    sink: SinkRef,
    on_complete: Option<CompletionHook>,
}

impl Warmup {
    pub fn new(options: WarmupOptions) -> Self {
        Self {
            options,
            transport: None,
            sink: Arc::new(NoopSink),
            on_complete: None,
        }
    }

    pub fn options(&self) -> &WarmupOptions {
        &self.options
    }

    /// Transport for URL tasks; a `reqwest` client is built when unset
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Where progress lines go; discarded by default
    pub fn sink(mut self, sink: SinkRef) -> Self {
        self.sink = sink;
        self
    }

    /// Called once with the final result, after the listener is closed
    pub fn on_complete(mut self, hook: impl FnOnce(&WarmupResult) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Bind `server`, run `tasks` against it and close it again
    pub async fn run<S, I>(self, server: &mut S, tasks: I) -> WarmupResult
    where
        S: WarmupServer,
        I: IntoIterator,
        I::Item: Into<WarmupTaskSpec>,
    {
        let specs: Vec<WarmupTaskSpec> = tasks.into_iter().map(Into::into).collect();
        let Warmup {
            options,
            transport,
            sink,
            on_complete,
        } = self;

        let session = Session {
            options,
            transport,
            sink,
        };
        let result = session.execute(server, specs).await;

        if let Some(hook) = on_complete {
            hook(&result);
        }
        result
    }
}

impl Default for Warmup {
    fn default() -> Self {
        Self::new(WarmupOptions::default())
    }
}

/// Run `tasks` against `server` with the default transport and no logging
pub async fn run_warmup<S, I>(server: &mut S, tasks: I, options: WarmupOptions) -> WarmupResult
where
    S: WarmupServer,
    I: IntoIterator,
    I::Item: Into<WarmupTaskSpec>,
{
    Warmup::new(options).run(server, tasks).await
}

struct Session {
    options: WarmupOptions,
    transport: Option<Arc<dyn HttpTransport>>,
    sink: SinkRef,
}

impl Session {
    async fn execute<S: WarmupServer>(
        &self,
        server: &mut S,
        specs: Vec<WarmupTaskSpec>,
    ) -> WarmupResult {
        let mut phase = Phase::Idle;
        let result = self.drive(&mut phase, server, specs).await;
        phase.finish(&result);
        result
    }

    async fn drive<S: WarmupServer>(
        &self,
        phase: &mut Phase,
        server: &mut S,
        specs: Vec<WarmupTaskSpec>,
    ) -> WarmupResult {
        let mut stopwatch = Stopwatch::new();

        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(HttpClient::new()?),
        };

        phase.advance(Phase::Binding);
        let binder = PortBinder::from_options(&self.options);
        let Bound {
            listener,
            port,
            attempts,
        } = binder.bind(server, self.sink.as_ref()).await?;
        stopwatch.lap("bind");

        let mut guard = ListenerGuard::new(server, listener, port);
        let ctx = RunContext::new(self.options.host.as_str(), port);

        let outcome = self.run_tasks(phase, specs, &ctx, transport).await;
        stopwatch.lap("tasks");

        phase.advance(Phase::Closing);
        self.sink.info("Closing the server!");
        let closed = guard.close().await;
        stopwatch.lap("close");

        debug!("Warmup timings: {}", stopwatch.format());

        match (outcome, closed) {
            (Ok(tasks), Ok(())) => Ok(WarmupSummary {
                port,
                attempts,
                tasks,
                elapsed: stopwatch.total(),
            }),
            (Ok(_), Err(close_err)) => {
                self.sink.error(&close_err.to_string());
                Err(close_err)
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                self.sink.error(&close_err.to_string());
                Err(err)
            }
        }
    }

    /// Normalize and run; the task count on success
    async fn run_tasks(
        &self,
        phase: &mut Phase,
        specs: Vec<WarmupTaskSpec>,
        ctx: &RunContext,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<usize, WarmupError> {
        let tasks = normalize(
            specs,
            ctx,
            self.options.timeout,
            transport,
            self.sink.as_ref(),
        )?;

        phase.advance(Phase::Running);
        let report = ParallelRunner::from_options(&self.options, self.sink.clone())
            .run(tasks, ctx)
            .await;

        for task_report in &report.reports {
            debug!("{}", task_report);
        }
        debug!(
            "{} of {} warmup task(s) succeeded in {}ms (speedup {:.2}x)",
            report.succeeded(),
            report.total(),
            report.elapsed.as_millis(),
            parallel_speedup(&report)
        );

        let total = report.total();
        report
            .into_result(self.options.error_order)
            .into_result()
            .map(|()| total)
    }
}
