//! In-process TCP server adapter
//!
//! Binds a `tokio` listener and hands it to a serve function together with a
//! shutdown signal. Works with any server that can run on a
//! `tokio::net::TcpListener`, e.g. `axum::serve(..).with_graceful_shutdown(..)`.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::WarmupServer;

/// Resolves when the serve function should stop accepting connections
pub type ShutdownSignal = BoxFuture<'static, ()>;

const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Serves on a freshly bound `TcpListener` per warmup run
pub struct TcpServer<F> {
    host: String,
    serve: F,
    grace: Duration,
}

impl<F, Fut> TcpServer<F>
where
    F: FnMut(TcpListener, ShutdownSignal) -> Fut + Send,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    pub fn new(host: impl Into<String>, serve: F) -> Self {
        Self {
            host: host.into(),
            serve,
            grace: DEFAULT_GRACE,
        }
    }

    /// How long `close` waits for the serve task to drain
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// A running serve task
pub struct TcpHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl TcpHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl<F, Fut> WarmupServer for TcpServer<F>
where
    F: FnMut(TcpListener, ShutdownSignal) -> Fut + Send,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
{
    type Listener = TcpHandle;

    fn listen(&mut self, port: u16) -> BoxFuture<'_, io::Result<TcpHandle>> {
        async move {
            let listener = TcpListener::bind((self.host.as_str(), port)).await?;
            let local_addr = listener.local_addr()?;

            let (tx, rx) = oneshot::channel::<()>();
            let shutdown: ShutdownSignal = async move {
                let _ = rx.await;
            }
            .boxed();

            let task = tokio::spawn((self.serve)(listener, shutdown));
            debug!("Serving warmup listener on {}", local_addr);

            Ok(TcpHandle {
                local_addr,
                shutdown: tx,
                task,
            })
        }
        .boxed()
    }

    fn close(&mut self, handle: TcpHandle) -> BoxFuture<'_, io::Result<()>> {
        let grace = self.grace;
        async move {
            let TcpHandle {
                local_addr,
                shutdown,
                mut task,
            } = handle;

            // The serve task may already have exited; that is not an error here.
            let _ = shutdown.send(());

            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("serve task for {local_addr} failed: {join_err}"),
                )),
                Err(_) => {
                    warn!(
                        "Listener on {} did not drain within {}ms, aborting",
                        local_addr,
                        grace.as_millis()
                    );
                    task.abort();
                    let _ = task.await;
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("listener on {local_addr} did not shut down in time"),
                    ))
                }
            }
        }
        .boxed()
    }
}
