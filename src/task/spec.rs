//! Warmup task specs as callers write them
//!
//! A spec is one of two shapes: an HTTP path to request, or a function to
//! run. Strings and untyped JSON/YAML values convert into the URL shape.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::RunContext;
use crate::error::WarmupError;

/// Future a task runs to completion
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Shared task body; called once per run
pub type TaskFnRef = Arc<dyn Fn(RunContext) -> TaskFuture + Send + Sync>;

/// Request against the warmup listener
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTask {
    /// Path relative to the listener, e.g. `/foo?bar=1`
    pub path: String,

    /// Display name; defaults to the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Per-task timeout; the run default applies when unset
    #[serde(
        default,
        rename = "timeout_ms",
        with = "opt_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// HTTP method; GET when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl UrlTask {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Arbitrary async work run against the bound listener
#[derive(Clone)]
pub struct FunctionTask {
    pub name: Option<String>,
    pub timeout: Option<Duration>,
    pub(crate) run: TaskFnRef,
}

impl FunctionTask {
    /// Wrap a closure that creates the task's future from the run context
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: None,
            timeout: None,
            run: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    pub fn named<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(f).name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for FunctionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTask")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One warmup task as supplied by the caller
#[derive(Clone, Debug)]
pub enum WarmupTaskSpec {
    Url(UrlTask),
    Function(FunctionTask),
}

impl WarmupTaskSpec {
    pub fn path(path: impl Into<String>) -> Self {
        WarmupTaskSpec::Url(UrlTask::new(path))
    }

    pub fn func<F, Fut>(f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        WarmupTaskSpec::Function(FunctionTask::new(f))
    }

    /// Interpret an untyped plan entry
    ///
    /// Accepts a string path or an object with a string `path` field; any
    /// other shape is rejected with the entry's index.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, WarmupError> {
        match value {
            Value::String(path) => Ok(WarmupTaskSpec::path(path.clone())),
            Value::Object(map) => match map.get("path") {
                Some(Value::String(_)) => serde_json::from_value::<UrlTask>(value.clone())
                    .map(WarmupTaskSpec::Url)
                    .map_err(|e| WarmupError::invalid(index, e.to_string())),
                Some(_) => Err(WarmupError::invalid(
                    index,
                    "request object has a non-string \"path\" property",
                )),
                None => Err(WarmupError::invalid(
                    index,
                    "request object does not have a \"path\" property",
                )),
            },
            other => Err(WarmupError::invalid(
                index,
                format!(
                    "expected a path string or a request object, got {}",
                    value_kind(other)
                ),
            )),
        }
    }
}

impl From<&str> for WarmupTaskSpec {
    fn from(path: &str) -> Self {
        WarmupTaskSpec::path(path)
    }
}

impl From<String> for WarmupTaskSpec {
    fn from(path: String) -> Self {
        WarmupTaskSpec::path(path)
    }
}

impl From<UrlTask> for WarmupTaskSpec {
    fn from(task: UrlTask) -> Self {
        WarmupTaskSpec::Url(task)
    }
}

impl From<FunctionTask> for WarmupTaskSpec {
    fn from(task: FunctionTask) -> Self {
        WarmupTaskSpec::Function(task)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `Option<Duration>` as integer milliseconds
mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&ms)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
