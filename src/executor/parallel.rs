//! Parallel task execution
//!
//! Runs every canonical task at once (optionally capped by a semaphore),
//! races each against its own timer and records exactly one outcome per
//! task through a [`CompletionLatch`].

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::latch::CompletionLatch;
use crate::config::WarmupOptions;
use crate::error::WarmupError;
use crate::models::{RunReport, TaskOutcome, TaskReport};
use crate::task::{CanonicalTask, RunContext};
use crate::utils::{SinkRef, Timer};

type Settled = (TaskOutcome, Instant);

/// Parallel warmup task executor
pub struct ParallelRunner {
    max_concurrent: Option<usize>,
    cancel_on_timeout: bool,
    sink: SinkRef,
}

impl ParallelRunner {
    pub fn new(sink: SinkRef) -> Self {
        Self {
            max_concurrent: None,
            cancel_on_timeout: true,
            sink,
        }
    }

    pub fn from_options(options: &WarmupOptions, sink: SinkRef) -> Self {
        Self {
            max_concurrent: options.max_concurrent,
            cancel_on_timeout: options.cancel_on_timeout,
            sink,
        }
    }

    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit);
        self
    }

    pub fn with_cancel_on_timeout(mut self, cancel: bool) -> Self {
        self.cancel_on_timeout = cancel;
        self
    }

    /// Run all tasks and wait for every one of them to reach an outcome
    ///
    /// A failing task never stops its siblings.
    pub async fn run(&self, tasks: Vec<CanonicalTask>, ctx: &RunContext) -> RunReport {
        let total = tasks.len();
        let semaphore = self
            .max_concurrent
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        debug!(
            "Running {} warmup task(s) (max concurrent: {})",
            total,
            self.max_concurrent
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );

        let timer = Timer::start("warmup tasks");
        let runs = tasks
            .into_iter()
            .map(|task| self.run_task(task, total, ctx.clone(), semaphore.clone()));
        let settled = join_all(runs).await;

        RunReport::new(rank_arrivals(settled), timer.stop())
    }

    async fn run_task(
        &self,
        task: CanonicalTask,
        total: usize,
        ctx: RunContext,
        semaphore: Option<Arc<Semaphore>>,
    ) -> (TaskReport, Instant) {
        // The semaphore is never closed, so acquisition only waits.
        let _permit = match semaphore {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        let index = task.index();
        let name = task.name().to_string();
        let timeout = task.timeout();
        let label = format!("task {} of {} ({})", index + 1, total, name);

        self.sink.info(&format!("Running {label}"));
        let timer = Timer::start(label.clone());

        let latch: Arc<CompletionLatch<Settled>> = Arc::new(CompletionLatch::new());
        let handle = {
            let latch = latch.clone();
            let name = name.clone();
            let label = label.clone();
            // Invoked on first poll so a panic while building the future is caught too.
            let work = async move { task.start(ctx).await };

            tokio::spawn(async move {
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(())) => TaskOutcome::Success,
                    Ok(Err(err)) => TaskOutcome::Failure(WarmupError::task_failure(index, &name, &err)),
                    Err(panic) => TaskOutcome::Failure(WarmupError::TaskFailure {
                        index,
                        name,
                        message: format!("task panicked: {}", panic_message(&*panic)),
                    }),
                };
                if !latch.settle((outcome, Instant::now())) {
                    debug!("Discarding late outcome of {}", label);
                }
            })
        };

        if timeout.is_zero() {
            latch.wait().await;
        } else {
            tokio::select! {
                _ = latch.wait() => {}
                _ = tokio::time::sleep(timeout) => {
                    let err = WarmupError::TaskTimeout {
                        index,
                        name: name.clone(),
                        timeout,
                    };
                    if latch.settle((TaskOutcome::Failure(err), Instant::now())) && self.cancel_on_timeout {
                        handle.abort();
                    }
                }
            }
        }

        let (outcome, settled_at) = latch.take().unwrap_or_else(|| {
            warn!("{} finished without an outcome", label);
            let err = WarmupError::TaskFailure {
                index,
                name: name.clone(),
                message: "task finished without an outcome".to_string(),
            };
            (TaskOutcome::Failure(err), Instant::now())
        });

        match outcome.error() {
            None => self.sink.info(&format!("Completed {label}")),
            Some(err) => self.sink.error(&format!("Error in warming up {label}: {err}")),
        }

        let report = TaskReport {
            index,
            name,
            outcome,
            duration: timer.stop(),
            arrival: 0,
        };
        (report, settled_at)
    }
}

/// Number reports in the order their outcomes were recorded
fn rank_arrivals(mut settled: Vec<(TaskReport, Instant)>) -> Vec<TaskReport> {
    settled.sort_by_key(|(report, at)| (*at, report.index));
    settled
        .into_iter()
        .enumerate()
        .map(|(arrival, (mut report, _))| {
            report.arrival = arrival;
            report
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Sum of task durations over wall-clock time; above 1.0 means tasks overlapped
pub fn parallel_speedup(report: &RunReport) -> f64 {
    let sum: Duration = report.reports.iter().map(|r| r.duration).sum();
    if report.elapsed.is_zero() {
        1.0
    } else {
        sum.as_secs_f64() / report.elapsed.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorOrder, RunResult};
    use crate::task::{FunctionTask, TaskFnRef, TaskFuture};
    use crate::utils::MemorySink;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn ctx() -> RunContext {
        RunContext::new("localhost", 15000)
    }

    fn sleeper(index: usize, name: &str, work: Duration, timeout: Duration, fail: bool) -> CanonicalTask {
        let execute: TaskFnRef = FunctionTask::new(move |_ctx| async move {
            sleep(work).await;
            if fail {
                anyhow::bail!("boom");
            }
            Ok(())
        })
        .run;
        CanonicalTask::new(index, name, timeout, execute)
    }

    fn runner() -> (ParallelRunner, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (ParallelRunner::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_tasks_run_in_parallel() {
        let (runner, _sink) = runner();
        let tasks = vec![
            sleeper(0, "a", Duration::from_millis(100), Duration::from_millis(1000), false),
            sleeper(1, "b", Duration::from_millis(200), Duration::from_millis(1000), false),
            sleeper(2, "c", Duration::from_millis(500), Duration::from_millis(1000), false),
        ];

        let report = runner.run(tasks, &ctx()).await;

        assert_eq!(report.succeeded(), 3);
        assert!(report.elapsed >= Duration::from_millis(500));
        // Sum is 800ms; parallel execution stays close to the slowest.
        assert!(report.elapsed < Duration::from_millis(780), "took {:?}", report.elapsed);
        assert!(parallel_speedup(&report) > 1.0);
        assert!(report.into_result(ErrorOrder::ByIndex).is_success());
    }

    #[tokio::test]
    async fn test_timeout_produces_single_outcome() {
        let (runner, sink) = runner();
        let tasks = vec![sleeper(0, "slow", Duration::from_millis(400), Duration::from_millis(50), false)];

        let report = runner.run(tasks, &ctx()).await;
        assert_eq!(report.total(), 1);
        match &report.reports[0].outcome {
            TaskOutcome::Failure(WarmupError::TaskTimeout { name, timeout, .. }) => {
                assert_eq!(name, "slow");
                assert_eq!(*timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(report.elapsed < Duration::from_millis(300));
        assert!(sink.contains("Error in warming up task 1 of 1 (slow): Warmup task timed out after 50ms: slow"));
    }

    #[tokio::test]
    async fn test_completion_before_timeout_cancels_timer() {
        let (runner, sink) = runner();
        let tasks = vec![sleeper(0, "Long task", Duration::from_millis(400), Duration::from_millis(500), false)];

        let report = runner.run(tasks, &ctx()).await;
        assert!(report.reports[0].outcome.is_success());

        // Give a would-be stray timer time to fire.
        sleep(Duration::from_millis(200)).await;
        assert!(!sink.contains("timed out"));
        assert!(sink.contains("Completed task 1 of 1 (Long task)"));
    }

    #[tokio::test]
    async fn test_abandoned_task_late_completion_is_discarded() {
        let (runner, _sink) = runner();
        let runner = runner.with_cancel_on_timeout(false);
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let execute = FunctionTask::new(move |_ctx| {
            let flag = flag.clone();
            async move {
                sleep(Duration::from_millis(150)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .run;
        let tasks = vec![CanonicalTask::new(0, "late", Duration::from_millis(30), execute)];

        let report = runner.run(tasks, &ctx()).await;
        assert!(report.reports[0].outcome.error().is_some_and(WarmupError::is_timeout));

        sleep(Duration::from_millis(250)).await;
        // The abandoned work did finish, but the recorded outcome is unchanged.
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timed_out_task_is_aborted() {
        let (runner, _sink) = runner();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let execute = FunctionTask::new(move |_ctx| {
            let flag = flag.clone();
            async move {
                sleep(Duration::from_millis(150)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .run;
        let tasks = vec![CanonicalTask::new(0, "cancelled", Duration::from_millis(30), execute)];

        runner.run(tasks, &ctx()).await;
        sleep(Duration::from_millis(250)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_zero_timeout_waits_indefinitely() {
        let (runner, _sink) = runner();
        let tasks = vec![sleeper(0, "untimed", Duration::from_millis(120), Duration::ZERO, false)];
        let report = runner.run(tasks, &ctx()).await;
        assert!(report.reports[0].outcome.is_success());
        assert!(report.reports[0].duration >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let (runner, _sink) = runner();
        let tasks = vec![
            sleeper(0, "/foo", Duration::from_millis(50), Duration::from_millis(300), false),
            sleeper(1, "/bar", Duration::from_millis(50), Duration::from_millis(300), true),
            sleeper(2, "/baz", Duration::from_millis(150), Duration::from_millis(300), false),
        ];

        let report = runner.run(tasks, &ctx()).await;
        assert_eq!(report.succeeded(), 2);
        assert!(report.reports[0].outcome.is_success());
        assert!(report.reports[2].outcome.is_success());

        match report.into_result(ErrorOrder::ByIndex) {
            RunResult::Failed(WarmupError::TaskFailure { index, name, message }) => {
                assert_eq!(index, 1);
                assert_eq!(name, "/bar");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_arrival_order_recorded() {
        let (runner, _sink) = runner();
        let tasks = vec![
            sleeper(0, "slow", Duration::from_millis(300), Duration::ZERO, true),
            sleeper(1, "fast", Duration::from_millis(20), Duration::ZERO, true),
        ];

        let report = runner.run(tasks, &ctx()).await;
        assert_eq!(report.reports[0].arrival, 1);
        assert_eq!(report.reports[1].arrival, 0);

        match report.into_result(ErrorOrder::ByArrival) {
            RunResult::Failed(err) => assert_eq!(err.task_index(), Some(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_task_is_failure() {
        let (runner, _sink) = runner();
        let execute = FunctionTask::new(|_ctx| async {
            if true {
                panic!("handler exploded");
            }
            Ok(())
        })
        .run;
        let tasks = vec![CanonicalTask::new(0, "panics", Duration::from_millis(500), execute)];

        let report = runner.run(tasks, &ctx()).await;
        let err = report.reports[0].outcome.error().unwrap();
        assert!(err.to_string().contains("task panicked: handler exploded"));
    }

    #[tokio::test]
    async fn test_panic_before_future_is_failure() {
        let (runner, _sink) = runner();
        let execute: TaskFnRef = Arc::new(|_ctx: RunContext| -> TaskFuture {
            panic!("closure exploded");
        });
        let tasks = vec![
            CanonicalTask::new(0, "eager", Duration::from_millis(500), execute),
            sleeper(1, "sibling", Duration::from_millis(20), Duration::from_millis(500), false),
        ];

        let report = runner.run(tasks, &ctx()).await;
        let err = report.reports[0].outcome.error().unwrap();
        assert!(matches!(err, WarmupError::TaskFailure { index: 0, .. }));
        assert!(err.to_string().contains("task panicked: closure exploded"));
        assert!(report.reports[1].outcome.is_success());
    }

    #[tokio::test]
    async fn test_execute_invoked_once_per_task() {
        let (runner, _sink) = runner();
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..5)
            .map(|i| {
                let calls = calls.clone();
                let execute = FunctionTask::new(move |_ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                })
                .run;
                CanonicalTask::new(i, format!("t{i}"), Duration::from_millis(200), execute)
            })
            .collect();

        let report = runner.run(tasks, &ctx()).await;
        assert_eq!(report.total(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_max_concurrent_bounds_in_flight() {
        let (runner, _sink) = runner();
        let runner = runner.with_max_concurrent(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6)
            .map(|i| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                let execute = FunctionTask::new(move |_ctx| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(40)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .run;
                CanonicalTask::new(i, format!("t{i}"), Duration::ZERO, execute)
            })
            .collect();

        let report = runner.run(tasks, &ctx()).await;
        assert_eq!(report.succeeded(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_reaches_tasks() {
        let (runner, _sink) = runner();
        let seen = Arc::new(AtomicUsize::new(0));
        let port = seen.clone();
        let execute = FunctionTask::new(move |ctx: RunContext| {
            port.store(ctx.port() as usize, Ordering::SeqCst);
            async { Ok(()) }
        })
        .run;

        runner
            .run(vec![CanonicalTask::new(0, "ctx", Duration::ZERO, execute)], &ctx())
            .await;
        assert_eq!(seen.load(Ordering::SeqCst), 15000);
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let (runner, sink) = runner();
        let report = runner.run(Vec::new(), &ctx()).await;
        assert_eq!(report.total(), 0);
        assert!(sink.lines().is_empty());
        assert!(report.into_result(ErrorOrder::ByIndex).is_success());
    }
}
