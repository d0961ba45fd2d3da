//! Test doubles for the server and transport capabilities

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::server::WarmupServer;

/// Transport answering from a table of path -> status, 200 by default
#[derive(Default)]
pub struct MockTransport {
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    refused: HashSet<String>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, path: &str, status: u16) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }

    pub fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn refuse(mut self, path: &str) -> Self {
        self.refused.insert(path.to_string());
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// `/path?query` part of `http://host:port/path?query`
fn path_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match without_scheme.find('/') {
        Some(i) => without_scheme[i..].to_string(),
        None => "/".to_string(),
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        async move {
            let path = path_of(&request.url);
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            if let Some(delay) = self.delays.get(&path) {
                tokio::time::sleep(*delay).await;
            }
            if self.refused.contains(&path) {
                return Err(HttpError::ConnectionRefused(request.url));
            }

            Ok(HttpResponse {
                status_code: self.statuses.get(&path).copied().unwrap_or(200),
                duration_ms: 0,
            })
        }
        .boxed()
    }
}

/// Server whose bind results follow a script; listeners are just ports
pub struct ScriptedServer {
    script: Box<dyn FnMut(u16) -> io::Result<()> + Send>,
    attempted: Vec<u16>,
    closed: Vec<u16>,
    close_error: Option<io::ErrorKind>,
}

impl ScriptedServer {
    pub fn new(script: impl FnMut(u16) -> io::Result<()> + Send + 'static) -> Self {
        Self {
            script: Box::new(script),
            attempted: Vec::new(),
            closed: Vec::new(),
            close_error: None,
        }
    }

    pub fn free() -> Self {
        Self::new(|_| Ok(()))
    }

    pub fn always_busy() -> Self {
        Self::new(|_| Err(io::Error::from(io::ErrorKind::AddrInUse)))
    }

    /// Ports below `free_port` are taken
    pub fn busy_until(free_port: u16) -> Self {
        Self::new(move |port| {
            if port < free_port {
                Err(io::Error::from(io::ErrorKind::AddrInUse))
            } else {
                Ok(())
            }
        })
    }

    pub fn failing(kind: io::ErrorKind) -> Self {
        Self::new(move |_| Err(io::Error::from(kind)))
    }

    pub fn fail_close(mut self, kind: io::ErrorKind) -> Self {
        self.close_error = Some(kind);
        self
    }

    pub fn attempted(&self) -> Vec<u16> {
        self.attempted.clone()
    }

    pub fn closed(&self) -> Vec<u16> {
        self.closed.clone()
    }
}

impl WarmupServer for ScriptedServer {
    type Listener = u16;

    fn listen(&mut self, port: u16) -> BoxFuture<'_, io::Result<u16>> {
        self.attempted.push(port);
        let result = (self.script)(port).map(|()| port);
        async move { result }.boxed()
    }

    fn close(&mut self, port: u16) -> BoxFuture<'_, io::Result<()>> {
        self.closed.push(port);
        let result = match self.close_error {
            Some(kind) => Err(io::Error::new(kind, "close failed")),
            None => Ok(()),
        };
        async move { result }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("http://localhost:1234/foo?x=1"), "/foo?x=1");
        assert_eq!(path_of("http://localhost:1234"), "/");
    }
}
