//! Standard I/O transports.
//!
//! Frames are newline-delimited JSON. [`StdioTransport`] serves over the
//! process's own stdin/stdout (the server side of a spawned MCP server);
//! [`ChildProcessTransport`] spawns the server as a subprocess and talks to
//! its pipes (the client side), forwarding the child's stderr to a
//! caller-supplied sink.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{Result, TransportError};
use crate::shared::codec::{parse_frame, serialize_frame};
use crate::shared::{Transport, TransportMessage};

/// Newline-delimited JSON over this process's stdin/stdout.
#[derive(Debug)]
pub struct StdioTransport {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
    stdout: Mutex<tokio::io::Stdout>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Create a transport over the process's standard streams.
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            stdout: Mutex::new(tokio::io::stdout()),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: TransportMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let bytes = serialize_frame(&message)?;
        let mut stdout = self.stdout.lock().await;
        stdout.write_all(&bytes).await.map_err(TransportError::from)?;
        stdout.write_all(b"\n").await.map_err(TransportError::from)?;
        stdout.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    async fn receive(&self) -> Result<TransportMessage> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let mut stdin = self.stdin.lock().await;
        loop {
            let mut line = String::new();
            let read = stdin.read_line(&mut line).await.map_err(TransportError::from)?;
            if read == 0 {
                self.closed.store(true, Ordering::Release);
                return Err(TransportError::ConnectionClosed.into());
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return parse_frame(line.as_bytes());
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        let mut stdout = self.stdout.lock().await;
        stdout.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

/// Sink receiving the child's stderr lines.
pub type StderrSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Spawner producing the server subprocess; injectable for tests.
pub type Spawner = Arc<dyn Fn(&StdioClientConfig) -> std::io::Result<Child> + Send + Sync>;

/// Configuration for [`ChildProcessTransport`].
#[derive(Clone)]
pub struct StdioClientConfig {
    /// Program to spawn.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub envs: Vec<(String, String)>,
    /// How long to wait after closing stdin before SIGKILL.
    pub kill_grace: Duration,
    /// Where the child's stderr lines go; defaults to `tracing::debug!`.
    pub stderr_sink: Option<StderrSink>,
    /// Override the process spawner (testing seam).
    pub spawner: Option<Spawner>,
}

impl std::fmt::Debug for StdioClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioClientConfig")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("kill_grace", &self.kill_grace)
            .field("stderr_sink", &self.stderr_sink.is_some())
            .field("spawner", &self.spawner.is_some())
            .finish()
    }
}

impl StdioClientConfig {
    /// Configuration spawning `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            envs: Vec::new(),
            kill_grace: Duration::from_secs(2),
            stderr_sink: None,
            spawner: None,
        }
    }

    /// Add arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the stderr sink.
    pub fn with_stderr_sink(mut self, sink: StderrSink) -> Self {
        self.stderr_sink = Some(sink);
        self
    }

    /// Replace the process spawner.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    fn spawn(&self) -> std::io::Result<Child> {
        if let Some(spawner) = &self.spawner {
            return spawner(self);
        }
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command.spawn()
    }
}

/// Client-side stdio transport over a spawned server subprocess.
pub struct ChildProcessTransport {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    closed: AtomicBool,
    kill_grace: Duration,
}

impl ChildProcessTransport {
    /// Spawn the configured server process and wire its pipes.
    pub fn spawn(config: StdioClientConfig) -> Result<Self> {
        let mut child = config.spawn().map_err(TransportError::Io)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::InvalidMessage("child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::InvalidMessage("child has no stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let sink: StderrSink = config.stderr_sink.clone().unwrap_or_else(|| {
                Arc::new(|line| tracing::debug!(target: "mcpio::stdio", "server stderr: {line}"))
            });
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    sink(&line);
                }
            });
        }

        Ok(Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            closed: AtomicBool::new(false),
            kill_grace: config.kill_grace,
        })
    }
}

#[async_trait]
impl Transport for ChildProcessTransport {
    async fn send(&self, message: TransportMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let bytes = serialize_frame(&message)?;
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        stdin.write_all(&bytes).await.map_err(TransportError::from)?;
        stdin.write_all(b"\n").await.map_err(TransportError::from)?;
        stdin.flush().await.map_err(TransportError::from)?;
        Ok(())
    }

    async fn receive(&self) -> Result<TransportMessage> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let mut stdout = self.stdout.lock().await;
        loop {
            let mut line = String::new();
            let read = stdout.read_line(&mut line).await.map_err(TransportError::from)?;
            if read == 0 {
                self.closed.store(true, Ordering::Release);
                return Err(TransportError::ConnectionClosed.into());
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return parse_frame(line.as_bytes());
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        // Closing stdin signals EOF; give the server a grace window to exit
        // before killing it.
        drop(self.stdin.lock().await.take());

        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            match tokio::time::timeout(self.kill_grace, child.wait()).await {
                Ok(status) => {
                    status.map_err(TransportError::from)?;
                },
                Err(_) => {
                    tracing::warn!(
                        target: "mcpio::stdio",
                        "server did not exit within grace period, killing"
                    );
                    child.start_kill().map_err(TransportError::from)?;
                    let _ = child.wait().await;
                },
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "stdio-child"
    }
}

impl std::fmt::Debug for ChildProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessTransport")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
