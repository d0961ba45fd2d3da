//! External process adapter
//!
//! Launches the server as a child process with `PORT=<port>` in its
//! environment and waits until it accepts TCP connections.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info};

use super::WarmupServer;

/// Spawns a command as the server under warmup
#[derive(Clone, Debug)]
pub struct ProcessServer {
    program: String,
    args: Vec<String>,
    envs: BTreeMap<String, String>,
    host: String,
    port_var: String,
    ready_timeout: Duration,
    poll_interval: Duration,
    inherit_output: bool,
}

impl ProcessServer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: BTreeMap::new(),
            host: "127.0.0.1".to_string(),
            port_var: "PORT".to_string(),
            ready_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            inherit_output: true,
        }
    }

    /// Build from `[program, args...]`
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// Host used for the port probe and readiness check
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Environment variable that carries the port (default `PORT`)
    pub fn port_var(mut self, name: impl Into<String>) -> Self {
        self.port_var = name.into();
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    fn command(&self, port: u16) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.envs)
            .env(&self.port_var, port.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !self.inherit_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        cmd
    }

    async fn wait_ready(&self, child: &mut Child, port: u16) -> io::Result<()> {
        let deadline = Instant::now() + self.ready_timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                return Err(exited_early(status));
            }
            if TcpStream::connect((self.host.as_str(), port)).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} did not accept connections on port {} within {}ms",
                        self.program,
                        port,
                        self.ready_timeout.as_millis()
                    ),
                ));
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn exited_early(status: ExitStatus) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("server process exited with {status} before accepting connections"),
    )
}

/// A running child process
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    port: u16,
}

impl ProcessHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl WarmupServer for ProcessServer {
    type Listener = ProcessHandle;

    fn listen(&mut self, port: u16) -> BoxFuture<'_, io::Result<ProcessHandle>> {
        async move {
            // A child cannot report "address in use" in a typed way, so probe
            // the port first and let the binder move on if it is taken.
            drop(TcpListener::bind((self.host.as_str(), port)).await?);

            let mut child = self.command(port).spawn()?;
            info!(
                "Started {} (pid {:?}) on port {}",
                self.program,
                child.id(),
                port
            );

            if let Err(err) = self.wait_ready(&mut child, port).await {
                let _ = child.kill().await;
                return Err(err);
            }

            Ok(ProcessHandle { child, port })
        }
        .boxed()
    }

    fn close(&mut self, handle: ProcessHandle) -> BoxFuture<'_, io::Result<()>> {
        async move {
            let ProcessHandle { mut child, port } = handle;
            if let Some(status) = child.try_wait()? {
                debug!("Server on port {} already exited with {}", port, status);
                return Ok(());
            }
            child.kill().await?;
            debug!("Stopped server on port {}", port);
            Ok(())
        }
        .boxed()
    }
}
