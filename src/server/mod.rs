//! The application server being warmed up
//!
//! A warmup run needs exactly two things from the server: start listening on
//! a port, and stop again. [`WarmupServer`] is that capability. Adapters
//! cover the common shapes: a pair of closures ([`FnServer`]), an in-process
//! TCP service ([`TcpServer`]) and an external process ([`ProcessServer`]).

mod binder;
mod process;
mod tcp;

use futures::future::BoxFuture;
use std::future::Future;
use std::io;

pub use binder::{Bound, PortBinder, PORT_RANGE};
pub use process::{ProcessHandle, ProcessServer};
pub use tcp::{ShutdownSignal, TcpHandle, TcpServer};

/// Start/stop capability of the server under warmup
///
/// `listen` must fail with [`io::ErrorKind::AddrInUse`] when the port is
/// taken; that is the only error the binder retries.
pub trait WarmupServer: Send {
    /// Handle for a bound listener, consumed by `close`
    type Listener: Send;

    fn listen(&mut self, port: u16) -> BoxFuture<'_, io::Result<Self::Listener>>;

    fn close(&mut self, listener: Self::Listener) -> BoxFuture<'_, io::Result<()>>;
}

/// Server built from a start closure and a stop closure
pub struct FnServer<S, C> {
    start: S,
    stop: C,
}

impl<S, C, L, StartFut, StopFut> FnServer<S, C>
where
    S: FnMut(u16) -> StartFut + Send,
    StartFut: Future<Output = io::Result<L>> + Send + 'static,
    C: FnMut(L) -> StopFut + Send,
    StopFut: Future<Output = io::Result<()>> + Send + 'static,
    L: Send,
{
    pub fn new(start: S, stop: C) -> Self {
        Self { start, stop }
    }
}

impl<S, C, L, StartFut, StopFut> WarmupServer for FnServer<S, C>
where
    S: FnMut(u16) -> StartFut + Send,
    StartFut: Future<Output = io::Result<L>> + Send + 'static,
    C: FnMut(L) -> StopFut + Send,
    StopFut: Future<Output = io::Result<()>> + Send + 'static,
    L: Send,
{
    type Listener = L;

    fn listen(&mut self, port: u16) -> BoxFuture<'_, io::Result<L>> {
        Box::pin((self.start)(port))
    }

    fn close(&mut self, listener: L) -> BoxFuture<'_, io::Result<()>> {
        Box::pin((self.stop)(listener))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_server_forwards_calls() {
        let stops = Arc::new(AtomicUsize::new(0));
        let counter = stops.clone();

        let mut server = FnServer::new(
            |port: u16| async move { Ok(port) },
            move |port: u16| {
                let counter = counter.clone();
                async move {
                    assert_eq!(port, 12001);
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        let listener = server.listen(12001).await.unwrap();
        server.close(listener).await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
