//! MCP tool wrapper for Conductor's tool system.
//!
//! `McpToolWrapper` exposes a tool of a connected MCP server through the
//! `Tool` trait of `conductor-tools`, so the execution agent can call it like
//! any other tool.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{ToolCall, ToolDefinition, ToolResult};
use conductor_tools::{Tool, ToolError, ToolRegistry};

use crate::client::McpClient;
use crate::protocol::McpToolDefinition;

/// Prefix for MCP tool names to avoid collisions with other tools.
pub const MCP_TOOL_PREFIX: &str = "mcp__";

/// Wrapper that exposes an MCP tool as a Conductor `Tool`.
pub struct McpToolWrapper {
    /// Full name, e.g. `mcp__howtocook__whatToEat`.
    full_name: String,
    server_name: String,
    tool_name: String,
    tool_def: McpToolDefinition,
    client: Arc<McpClient>,
}

impl McpToolWrapper {
    /// The tool name is prefixed with `mcp__<server>__`.
    pub fn new(server_name: impl Into<String>, tool_def: McpToolDefinition, client: Arc<McpClient>) -> Self {
        let server_name = server_name.into();
        let tool_name = tool_def.name.clone();
        let full_name = format!("{}{}__{}", MCP_TOOL_PREFIX, server_name, tool_name);

        Self {
            full_name,
            server_name,
            tool_name,
            tool_def,
            client,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }
}

#[async_trait]
impl Tool for McpToolWrapper {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn definition(&self) -> ToolDefinition {
        let description = self
            .tool_def
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool '{}' of MCP server '{}'", self.tool_name, self.server_name));

        ToolDefinition::new(&self.full_name, description).with_parameters(self.tool_def.input_schema.clone())
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let arguments = match &call.arguments {
            serde_json::Value::Null => None,
            other => Some(other.clone()),
        };

        let result = self
            .client
            .call_tool(&self.server_name, &self.tool_name, arguments)
            .await
            .map_err(|e| ToolError::execution(e.to_string()))?;

        let text = result.text();
        if result.is_error {
            Ok(ToolResult::error(&call.id, text))
        } else {
            Ok(ToolResult::success(&call.id, text))
        }
    }
}

/// Register every tool cached by `client` in `registry`.
pub async fn register_mcp_tools(client: Arc<McpClient>, registry: &mut ToolRegistry) {
    for (server_name, tool_def) in client.all_tools().await {
        let tool = McpToolWrapper::new(server_name, tool_def, Arc::clone(&client));
        registry.register(Arc::new(tool));
    }
}
