//! MCP-specific error types.

use conductor_core::TransportKind;
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to spawn the child process.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(std::io::Error),

    /// Failed to write to the transport.
    #[error("write error: {0}")]
    WriteError(std::io::Error),

    /// Failed to read from the transport.
    #[error("read error: {0}")]
    ReadError(std::io::Error),

    /// Connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// HTTP request could not be sent or read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },

    /// A receive was attempted with no response queued.
    #[error("no response available")]
    NoResponse,

    /// The transport kind is valid but not implemented here.
    #[error("transport '{0}' is not supported")]
    Unsupported(TransportKind),

    /// The config lacks a field its transport needs.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol-level error (malformed messages, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server not found by name.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// Server initialization failed.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Server returned an error response.
    #[error("server error (code {code}): {message}")]
    ServerError { code: i32, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection is not in the correct state.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Server already exists with this name.
    #[error("server already exists: {0}")]
    ServerAlreadyExists(String),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an initialization failed error.
    pub fn init_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a server error from JSON-RPC error.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<McpError> for conductor_core::Error {
    fn from(e: McpError) -> Self {
        conductor_core::Error::Mcp(e.to_string())
    }
}

/// Errors from calling a descriptor's HTTP endpoint directly.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Required parameters were absent; nothing was sent.
    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),

    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<EndpointError> for conductor_core::Error {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::MissingParameters(_) => conductor_core::Error::Validation(e.to_string()),
            other => conductor_core::Error::Mcp(other.to_string()),
        }
    }
}
