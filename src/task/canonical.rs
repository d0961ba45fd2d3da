//! Normalized tasks and the context they run in

use anyhow::Context;
use futures::FutureExt;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::spec::{FunctionTask, TaskFnRef, TaskFuture, UrlTask, WarmupTaskSpec};
use super::ANONYMOUS;
use crate::error::WarmupError;
use crate::http::{HttpError, HttpRequest, HttpTransport};
use crate::utils::LogSink;

/// Read-only view of the bound listener, handed to every task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunContext {
    host: Arc<str>,
    port: u16,
}

impl RunContext {
    pub fn new(host: impl Into<Arc<str>>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Port the listener actually bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Absolute URL for `path` on the bound listener
    pub fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

/// A task ready to run: index, name, timeout and one callable
pub struct CanonicalTask {
    index: usize,
    name: String,
    timeout: Duration,
    execute: TaskFnRef,
}

impl CanonicalTask {
    pub fn new(index: usize, name: impl Into<String>, timeout: Duration, execute: TaskFnRef) -> Self {
        Self {
            index,
            name: name.into(),
            timeout,
            execute,
        }
    }

    /// Position in the caller's task list
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero means no timer
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke the task body. Consumes the task so it can only start once.
    pub(crate) fn start(self, ctx: RunContext) -> TaskFuture {
        (self.execute)(ctx)
    }
}

impl fmt::Debug for CanonicalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalTask")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Turn caller specs into canonical tasks
///
/// Every spec is validated before any task is built, so a bad entry fails
/// the whole list with its index and nothing runs.
pub fn normalize(
    specs: Vec<WarmupTaskSpec>,
    ctx: &RunContext,
    default_timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    sink: &dyn LogSink,
) -> Result<Vec<CanonicalTask>, WarmupError> {
    for (index, spec) in specs.iter().enumerate() {
        if let WarmupTaskSpec::Url(task) = spec {
            validate_url_task(index, task)?;
        }
    }

    let tasks = specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| match spec {
            WarmupTaskSpec::Url(task) => {
                sink.info(&format!(
                    "Warming up \"{}\" ({})...",
                    task.path,
                    ctx.url(&task.path)
                ));
                url_task(index, task, default_timeout, transport.clone())
            }
            WarmupTaskSpec::Function(task) => function_task(index, task, default_timeout),
        })
        .collect();

    Ok(tasks)
}

fn validate_url_task(index: usize, task: &UrlTask) -> Result<(), WarmupError> {
    if task.path.is_empty() {
        return Err(WarmupError::invalid(index, "request path is empty"));
    }
    if !task.path.starts_with('/') {
        return Err(WarmupError::invalid(
            index,
            format!("request path \"{}\" must start with '/'", task.path),
        ));
    }
    if let Some(method) = &task.method {
        Method::from_bytes(method.as_bytes())
            .map_err(|_| WarmupError::invalid(index, format!("invalid HTTP method \"{method}\"")))?;
    }
    for (key, value) in &task.headers {
        HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| WarmupError::invalid(index, format!("invalid header name \"{key}\"")))?;
        HeaderValue::from_str(value)
            .map_err(|_| WarmupError::invalid(index, format!("invalid value for header \"{key}\"")))?;
    }
    Ok(())
}

fn url_task(
    index: usize,
    task: UrlTask,
    default_timeout: Duration,
    transport: Arc<dyn HttpTransport>,
) -> CanonicalTask {
    let name = task.name.clone().unwrap_or_else(|| task.path.clone());
    let timeout = task.timeout.unwrap_or(default_timeout);
    let method = task.method.unwrap_or_else(|| "GET".to_string());
    let UrlTask {
        path,
        headers,
        body,
        ..
    } = task;

    let execute: TaskFnRef = Arc::new(move |ctx: RunContext| {
        let transport = transport.clone();
        let url = ctx.url(&path);
        let mut request = HttpRequest::new(method.clone(), url.clone()).headers(headers.clone());
        if let Some(body) = &body {
            request = request.body(body.clone());
        }

        async move {
            let response = transport
                .send(request)
                .await
                .with_context(|| format!("Request to {url} failed"))?;

            if !response.is_success() {
                return Err(anyhow::Error::from(HttpError::Status {
                    url,
                    status: response.status_code,
                }));
            }
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    });

    CanonicalTask::new(index, name, timeout, execute)
}

fn function_task(index: usize, task: FunctionTask, default_timeout: Duration) -> CanonicalTask {
    let name = task.name.unwrap_or_else(|| ANONYMOUS.to_string());
    let timeout = task.timeout.unwrap_or(default_timeout);
    CanonicalTask::new(index, name, timeout, task.run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use crate::utils::MemorySink;
    use tokio_test::{assert_err, assert_ok};

    fn ctx() -> RunContext {
        RunContext::new("localhost", 12345)
    }

    #[test]
    fn test_context_url_uses_bound_port() {
        assert_eq!(ctx().url("/foo?x=1"), "http://localhost:12345/foo?x=1");
        assert_eq!(ctx().port(), 12345);
    }

    #[test]
    fn test_names_and_timeouts() {
        let transport = Arc::new(MockTransport::new());
        let specs = vec![
            WarmupTaskSpec::path("/foo"),
            UrlTask::new("/bar")
                .name("bar page")
                .timeout(Duration::from_millis(50))
                .into(),
            WarmupTaskSpec::func(|_ctx| async { Ok(()) }),
            FunctionTask::named("Long task", |_ctx| async { Ok(()) })
                .timeout(Duration::from_millis(500))
                .into(),
        ];
        let sink = MemorySink::new();

        let tasks = normalize(specs, &ctx(), Duration::from_millis(300), transport, &sink).unwrap();

        let summary: Vec<_> = tasks
            .iter()
            .map(|t| (t.index(), t.name().to_string(), t.timeout().as_millis()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "/foo".to_string(), 300),
                (1, "bar page".to_string(), 50),
                (2, "(anonymous)".to_string(), 300),
                (3, "Long task".to_string(), 500),
            ]
        );
        assert!(sink.contains("Warming up \"/foo\" (http://localhost:12345/foo)..."));
    }

    #[test]
    fn test_invalid_spec_fails_whole_list() {
        let transport = Arc::new(MockTransport::new());
        let specs = vec![
            WarmupTaskSpec::path("/ok"),
            WarmupTaskSpec::path("no-slash"),
            WarmupTaskSpec::path(""),
        ];
        let sink = MemorySink::new();

        let err = normalize(specs, &ctx(), Duration::ZERO, transport, &sink).unwrap_err();
        assert_eq!(err.task_index(), Some(1));
        // Nothing logged: validation runs before any task is built.
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_invalid_method_and_header() {
        let transport: Arc<dyn HttpTransport> = Arc::new(MockTransport::new());
        let sink = MemorySink::new();

        let bad_method = vec![UrlTask::new("/a").method("G ET").into()];
        let err = normalize(bad_method, &ctx(), Duration::ZERO, transport.clone(), &sink).unwrap_err();
        assert!(err.to_string().contains("invalid HTTP method"));

        let bad_header = vec![UrlTask::new("/a").header("bad header", "x").into()];
        let err = normalize(bad_header, &ctx(), Duration::ZERO, transport, &sink).unwrap_err();
        assert!(err.to_string().contains("invalid header name"));
    }

    #[tokio::test]
    async fn test_url_task_status_classification() {
        let transport = Arc::new(
            MockTransport::new()
                .status("/ok", 200)
                .status("/created", 201)
                .status("/missing", 404)
                .status("/moved", 301),
        );
        let specs = ["/ok", "/created", "/missing", "/moved"]
            .into_iter()
            .map(WarmupTaskSpec::from)
            .collect();
        let sink = MemorySink::new();
        let tasks = normalize(specs, &ctx(), Duration::ZERO, transport, &sink).unwrap();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.start(ctx()).await);
        }

        assert_ok!(&results[0]);
        assert_ok!(&results[1]);
        let missing = assert_err!(&results[2]);
        assert!(missing.to_string().contains("failed with HTTP status code 404"));
        assert_err!(&results[3]);
    }

    #[tokio::test]
    async fn test_url_task_forwards_overrides() {
        let transport = Arc::new(MockTransport::new());
        let specs = vec![UrlTask::new("/baz")
            .method("POST")
            .header("content-type", "application/json")
            .body("{\"warm\":true}")
            .into()];
        let sink = MemorySink::new();
        let tasks = normalize(specs, &ctx(), Duration::ZERO, transport.clone(), &sink).unwrap();

        let run_ctx = RunContext::new("127.0.0.1", 40001);
        for task in tasks {
            assert_ok!(task.start(run_ctx.clone()).await);
        }

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].url, "http://127.0.0.1:40001/baz");
        assert_eq!(
            sent[0].headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(sent[0].body.as_deref(), Some("{\"warm\":true}"));
    }

    #[tokio::test]
    async fn test_transport_error_is_failure() {
        let transport = Arc::new(MockTransport::new().refuse("/down"));
        let sink = MemorySink::new();
        let tasks = normalize(vec!["/down".into()], &ctx(), Duration::ZERO, transport, &sink).unwrap();

        for task in tasks {
            let err = task.start(ctx()).await.unwrap_err();
            assert!(format!("{err:#}").contains("Connection refused"));
        }
    }
}
