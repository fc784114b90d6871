//! MCP client implementation.
//!
//! This module provides the `McpConnection` for managing individual server connections
//! and `McpClient` for managing multiple servers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conductor_core::TransportConfig;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::McpError;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult, McpToolDefinition, RequestId,
};
use crate::transport::{connect_transport, Transport};

/// Timeout applied to each request when the server config sets none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection state for an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Connected but not initialized.
    Connected,
    /// Connection established and initialized.
    Ready,
    /// Connection is being closed.
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Ready => write!(f, "ready"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// A connection to a single MCP server.
pub struct McpConnection {
    name: String,
    transport: Mutex<Box<dyn Transport>>,
    state: RwLock<ConnectionState>,
    cached_tools: RwLock<Vec<McpToolDefinition>>,
    request_counter: AtomicU64,
    request_timeout: Duration,
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("name", &self.name)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl McpConnection {
    /// Create a new connection with an existing transport.
    pub fn new(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport: Mutex::new(transport),
            state: RwLock::new(ConnectionState::Connected),
            cached_tools: RwLock::new(Vec::new()),
            request_counter: AtomicU64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Tools cached by the last `list_tools`.
    pub async fn tools(&self) -> Vec<McpToolDefinition> {
        self.cached_tools.read().await.clone()
    }

    fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn ensure_state(&self, expected: ConnectionState) -> Result<(), McpError> {
        let state = *self.state.read().await;
        if state != expected {
            return Err(McpError::invalid_state(expected.to_string(), state.to_string()));
        }
        Ok(())
    }

    /// Send a request and wait for the response carrying the same id.
    ///
    /// Server notifications and responses to other ids are skipped.
    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, McpError>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = RequestId::from(self.next_request_id());
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let request_json = serde_json::to_string(&request)?;

        tokio::time::timeout(self.request_timeout, self.exchange(&id, &request_json))
            .await
            .map_err(|_| McpError::Timeout(self.request_timeout.as_secs()))?
    }

    async fn exchange<R>(&self, id: &RequestId, request_json: &str) -> Result<R, McpError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut transport = self.transport.lock().await;
        transport.send(request_json).await?;

        loop {
            let message = transport.receive().await?;
            let value: Value = serde_json::from_str(&message)
                .map_err(|e| McpError::protocol(format!("Failed to parse response: {}", e)))?;

            let matches = value
                .get("id")
                .and_then(|raw| serde_json::from_value::<RequestId>(raw.clone()).ok())
                .is_some_and(|got| &got == id);
            if !matches {
                debug!(server = %self.name, "Skipping unrelated message");
                continue;
            }

            let response: JsonRpcResponse<R> = serde_json::from_value(value)
                .map_err(|e| McpError::protocol(format!("Failed to parse response: {}", e)))?;

            if let Some(error) = response.error {
                return Err(McpError::server_error(error.code, error.message));
            }
            return response
                .result
                .ok_or_else(|| McpError::protocol("Response missing result"));
        }
    }

    /// Send a notification (no response expected).
    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), McpError>
    where
        P: serde::Serialize,
    {
        let notification = JsonRpcNotification::new(method, params);
        let notification_json = serde_json::to_string(&notification)?;

        let mut transport = self.transport.lock().await;
        transport.send(&notification_json).await?;

        Ok(())
    }

    /// Run the initialize handshake.
    pub async fn initialize(&self) -> Result<(), McpError> {
        self.ensure_state(ConnectionState::Connected).await?;

        debug!(server = %self.name, "Initializing MCP connection");

        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await
            .map_err(|e| McpError::init_failed(format!("{}: {}", self.name, e)))?;

        self.notify::<()>("notifications/initialized", None).await?;

        *self.state.write().await = ConnectionState::Ready;

        info!(
            server = %self.name,
            server_name = %result.server_info.name,
            protocol_version = %result.protocol_version,
            "MCP connection initialized"
        );

        Ok(())
    }

    /// List every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.ensure_state(ConnectionState::Ready).await?;

        debug!(server = %self.name, "Listing tools");

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| ListToolsParams { cursor });
            let page: ListToolsResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        *self.cached_tools.write().await = tools.clone();

        debug!(server = %self.name, tool_count = tools.len(), "Listed tools");

        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult, McpError> {
        self.ensure_state(ConnectionState::Ready).await?;

        debug!(server = %self.name, tool = name, "Calling tool");

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            warn!(server = %self.name, tool = name, "Tool returned error");
        }

        Ok(result)
    }

    /// Close the connection. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), McpError> {
        let state = *self.state.read().await;
        if state == ConnectionState::Disconnected {
            return Ok(());
        }

        *self.state.write().await = ConnectionState::Closing;

        debug!(server = %self.name, "Closing MCP connection");

        let result = self.transport.lock().await.close().await;
        *self.state.write().await = ConnectionState::Disconnected;
        result?;

        info!(server = %self.name, "MCP connection closed");

        Ok(())
    }
}

/// Client for managing multiple MCP server connections.
pub struct McpClient {
    connections: RwLock<HashMap<String, Arc<McpConnection>>>,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Open, initialize and register a connection, caching its tool list.
    pub async fn connect(&self, name: &str, config: &TransportConfig) -> Result<Arc<McpConnection>, McpError> {
        if self.connections.read().await.contains_key(name) {
            return Err(McpError::ServerAlreadyExists(name.to_string()));
        }

        info!(server = name, transport = %config.transport, "Connecting to MCP server");

        let transport = connect_transport(config).await?;
        let timeout = config.timeout_duration().unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        self.attach(McpConnection::new(name, transport).with_timeout(timeout)).await
    }

    /// Initialize an already-open connection and register it.
    ///
    /// The connection is closed again if the handshake or tool listing fails.
    pub async fn attach(&self, connection: McpConnection) -> Result<Arc<McpConnection>, McpError> {
        let name = connection.name().to_string();
        if self.connections.read().await.contains_key(&name) {
            return Err(McpError::ServerAlreadyExists(name));
        }

        let connection = Arc::new(connection);
        let setup = match connection.initialize().await {
            Ok(()) => connection.list_tools().await.map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = setup {
            let _ = connection.close().await;
            return Err(e);
        }

        self.connections.write().await.insert(name, Arc::clone(&connection));

        Ok(connection)
    }

    /// Connect to every server concurrently.
    ///
    /// If any connection fails the ones that succeeded are closed again and
    /// the first error is returned, so the client is either fully set up or
    /// empty.
    pub async fn connect_all(&self, servers: &BTreeMap<String, TransportConfig>) -> Result<(), McpError> {
        let results = join_all(servers.iter().map(|(name, config)| self.connect(name, config))).await;

        let mut first_error = None;
        for ((name, _), result) in servers.iter().zip(results) {
            if let Err(e) = result {
                error!(server = %name, error = %e, "Failed to connect MCP server");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                self.disconnect_all().await;
                Err(e)
            }
            None => Ok(()),
        }
    }

    pub async fn disconnect(&self, name: &str) -> Result<(), McpError> {
        let connection = self
            .connections
            .write()
            .await
            .remove(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;

        connection.close().await
    }

    /// Close and forget every connection, logging close failures.
    pub async fn disconnect_all(&self) {
        let connections: Vec<Arc<McpConnection>> = {
            let mut connections = self.connections.write().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        for connection in connections {
            if let Err(e) = connection.close().await {
                error!(server = %connection.name(), error = %e, "Failed to close connection");
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<McpConnection>> {
        self.connections.read().await.get(name).cloned()
    }

    /// Connected server names, sorted.
    pub async fn list_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// All cached tools as `(server, tool)` pairs, sorted by server then tool.
    pub async fn all_tools(&self) -> Vec<(String, McpToolDefinition)> {
        let connections: Vec<(String, Arc<McpConnection>)> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(name, conn)| (name.clone(), Arc::clone(conn)))
            .collect();

        let mut tools = Vec::new();
        for (server_name, connection) in connections {
            for tool in connection.tools().await {
                tools.push((server_name.clone(), tool));
            }
        }
        tools.sort_by(|a, b| (&a.0, &a.1.name).cmp(&(&b.0, &b.1.name)));
        tools
    }

    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        let connection = self
            .get(server)
            .await
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;

        connection.call_tool(tool, arguments).await
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}
