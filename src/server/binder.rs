//! Port acquisition
//!
//! Picks a starting port and probes upward until the server binds, the
//! attempt budget runs out, or a bind error that retrying cannot fix.

use rand::Rng;
use std::io;
use std::ops::RangeInclusive;
use tracing::debug;

use super::WarmupServer;
use crate::config::WarmupOptions;
use crate::error::WarmupError;
use crate::utils::LogSink;

/// Range a random starting port is drawn from
pub const PORT_RANGE: RangeInclusive<u16> = 10000..=50000;

/// A listener the server managed to bind
#[derive(Debug)]
pub struct Bound<L> {
    pub listener: L,
    /// Port the listener is bound to
    pub port: u16,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Binds with retry-on-conflict
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortBinder {
    start_port: u16,
    max_attempts: u32,
}

impl PortBinder {
    pub fn new(start_port: u16, max_attempts: u32) -> Self {
        Self {
            start_port,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fixed port from the options, else random in [`PORT_RANGE`]
    pub fn from_options(options: &WarmupOptions) -> Self {
        let start = options.port.unwrap_or_else(Self::random_port);
        Self::new(start, options.max_bind_attempts)
    }

    pub fn random_port() -> u16 {
        rand::rng().random_range(PORT_RANGE)
    }

    pub fn start_port(&self) -> u16 {
        self.start_port
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Bind `server`, moving to the next port whenever the current one is taken
    pub async fn bind<S: WarmupServer>(
        &self,
        server: &mut S,
        sink: &dyn LogSink,
    ) -> Result<Bound<S::Listener>, WarmupError> {
        if self.start_port == 0 {
            // An OS-assigned port would leave the reported port at 0.
            sink.error("Refusing to listen on port 0");
            return Err(WarmupError::Bind {
                port: 0,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "port 0 asks the OS for an ephemeral port; pass a concrete port",
                ),
            });
        }

        let mut port = self.start_port;
        let mut attempts = 0;

        loop {
            attempts += 1;
            sink.info(&format!("Attempting to listen on port {port}"));

            match server.listen(port).await {
                Ok(listener) => {
                    sink.info(&format!("Listening on port {port}"));
                    return Ok(Bound {
                        listener,
                        port,
                        attempts,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    debug!("Port {} in use: {}", port, err);
                    let next = port.checked_add(1).filter(|_| attempts < self.max_attempts);
                    match next {
                        Some(next) => {
                            sink.info(&format!(
                                "Failed to listen on port {port}. Trying next port..."
                            ));
                            port = next;
                        }
                        None => {
                            sink.error(&format!("Failed to listen on port {port}"));
                            return Err(WarmupError::PortExhausted {
                                attempts,
                                last_port: port,
                            });
                        }
                    }
                }
                Err(source) => {
                    sink.error(&format!("Error listening on port {port}: {source}"));
                    return Err(WarmupError::Bind { port, source });
                }
            }
        }
    }
}
