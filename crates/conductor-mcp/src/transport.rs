//! MCP transport implementations.
//!
//! Two transports are provided:
//! - [`StdioTransport`] spawns the server and exchanges newline-delimited
//!   JSON over stdin/stdout.
//! - [`HttpTransport`] POSTs each JSON-RPC message and queues whatever the
//!   server answers, which may be plain JSON or an SSE stream.
//!
//! [`connect_transport`] picks one from a registry [`TransportConfig`].

use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;

use async_trait::async_trait;
use conductor_core::sse::SseParser;
use conductor_core::{TransportConfig, TransportKind};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Header carrying the streamable HTTP session.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Trait for MCP transport implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to the server.
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive a message from the server.
    async fn receive(&mut self) -> Result<String, TransportError>;

    /// Close the transport connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// Open the transport described by `config`.
pub async fn connect_transport(config: &TransportConfig) -> Result<Box<dyn Transport>, TransportError> {
    match config.transport {
        TransportKind::Stdio => {
            let command = config
                .command
                .as_deref()
                .ok_or_else(|| TransportError::InvalidConfig("stdio transport needs 'command'".into()))?;
            let transport = StdioTransport::spawn(
                command,
                config.args.as_deref().unwrap_or_default(),
                config.env.clone().unwrap_or_default(),
                config.cwd.as_deref(),
            )
            .await?;
            Ok(Box::new(transport))
        }
        TransportKind::StreamableHttp | TransportKind::GenericHttp => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| TransportError::InvalidConfig(format!("{} transport needs 'url'", config.transport)))?;
            let mut transport = HttpTransport::new(url);
            if let Some(headers) = &config.headers {
                transport = transport.with_headers(headers.clone());
            }
            Ok(Box::new(transport))
        }
        other => Err(TransportError::Unsupported(other)),
    }
}

/// Standard I/O transport for MCP servers.
pub struct StdioTransport {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    connected: bool,
}

impl StdioTransport {
    /// Spawn `command` with `args`, extra `env` and an optional working dir.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: BTreeMap<String, String>,
        working_dir: Option<&str>,
    ) -> Result<Self, TransportError> {
        debug!(command, args = ?args, "Spawning MCP server process");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(TransportError::SpawnFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::SpawnFailed(std::io::Error::other("failed to capture stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::SpawnFailed(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            connected: true,
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        self.stdin
            .write_all(message.as_bytes())
            .await
            .map_err(TransportError::WriteError)?;
        self.stdin.write_all(b"\n").await.map_err(TransportError::WriteError)?;
        self.stdin.flush().await.map_err(TransportError::WriteError)?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let mut line = String::new();
        let bytes_read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(TransportError::ReadError)?;

        if bytes_read == 0 {
            self.connected = false;
            return Err(TransportError::ConnectionClosed);
        }

        Ok(line.trim_end().to_string())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        if let Some(pid) = self.child.id() {
            #[cfg(unix)]
            {
                use nix::sys::signal::{kill, Signal};
                use nix::unistd::Pid;

                debug!(pid, "Sending SIGTERM to MCP server");
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

                tokio::select! {
                    _ = self.child.wait() => {
                        debug!("MCP server exited gracefully");
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {
                        warn!(pid, "MCP server did not exit after SIGTERM, killing");
                        let _ = self.child.kill().await;
                    }
                }
            }

            #[cfg(not(unix))]
            {
                let _ = self.child.kill().await;
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// HTTP transport for streamable HTTP and plain JSON-RPC-over-HTTP servers.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
    session_id: Option<String>,
    pending: VecDeque<String>,
    connected: bool,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: BTreeMap::new(),
            session_id: None,
            pending: VecDeque::new(),
            connected: true,
        }
    }

    /// Extra headers sent with every request (auth tokens and the like).
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Session assigned by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, &self.url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }
        request
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let response = self
            .request(reqwest::Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(message.to_string())
            .send()
            .await?;

        let status = response.status();
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(session.to_string());
        }
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if is_sse {
            self.pending.extend(
                SseParser::parse_all(&body)
                    .into_iter()
                    .map(|event| event.data)
                    .filter(|data| !data.trim().is_empty()),
            );
        } else if !body.trim().is_empty() {
            self.pending.push_back(body);
        }

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.pending.pop_front().ok_or(TransportError::NoResponse)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.pending.clear();

        // Best effort: servers without sessions may reject DELETE.
        if self.session_id.is_some() {
            if let Err(e) = self.request(reqwest::Method::DELETE).send().await {
                debug!(url = %self.url, error = %e, "Session teardown failed");
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
