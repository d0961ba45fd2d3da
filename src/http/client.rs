//! HTTP transport for URL warmup tasks
//!
//! The runner only needs "send this request, tell me the status code". That
//! capability is the [`HttpTransport`] trait; [`HttpClient`] implements it on
//! top of `reqwest`.

use futures::future::BoxFuture;
use reqwest::{
    header::{HeaderName, HeaderValue},
    Client, Method,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// HTTP transport errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request to {url} failed with HTTP status code {status}")]
    Status { url: String, status: u16 },
}

/// Anything that can carry a warmup request to the server
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>>;
}

/// `reqwest`-backed transport
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client without a transport-level timeout
    ///
    /// Per-task timeouts are enforced by the runner, not here. Warmup
    /// targets are always the local listener, so system proxies are ignored.
    pub fn new() -> Result<Self, HttpError> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| HttpError::RequestFailed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Send HTTP request
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        debug!("Sending {} request to {}", request.method, request.url);

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| HttpError::InvalidRequest(format!("invalid method {}", request.method)))?;

        let mut req_builder = self.client.request(method, &request.url);

        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| HttpError::InvalidRequest(format!("invalid header name {key}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| HttpError::InvalidRequest(format!("invalid value for header {key}")))?;
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let start = Instant::now();

        let response = req_builder.send().await.map_err(|e| {
            if e.is_connect() {
                HttpError::ConnectionRefused(request.url.clone())
            } else {
                HttpError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();

        // Drain the body so the handler runs to completion on the server side.
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::RequestFailed(format!("failed to read response body: {e}")))?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(
            "Response: {} {} ({} bytes) in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            body.len(),
            duration_ms
        );

        Ok(HttpResponse {
            status_code: status.as_u16(),
            duration_ms,
        })
    }
}

impl HttpTransport for HttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        Box::pin(self.execute(request))
    }
}

/// HTTP request descriptor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// What the runner learns from a response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status_code: u16,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
