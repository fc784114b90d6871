//! Registry exploration tools.
//!
//! Discovery gives the model exactly these two tools. Neither one fails as a
//! tool call when the registry rejects a path: the error is returned as JSON
//! so the model can back up and try another directory.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{ToolCall, ToolDefinition, ToolResult};
use conductor_registry::RegistryStore;
use serde_json::json;
use tracing::debug;

use crate::registry::{Tool, ToolRegistry};
use crate::ToolError;

fn path_arg(call: &ToolCall) -> Result<&str, ToolError> {
    call.str_arg("path").ok_or_else(|| ToolError::missing_param("path"))
}

fn require_path(arguments: &serde_json::Value) -> Result<(), ToolError> {
    match arguments.get("path") {
        Some(v) if v.is_string() => Ok(()),
        Some(_) => Err(ToolError::invalid_args("'path' must be a string")),
        None => Err(ToolError::missing_param("path")),
    }
}

/// Lists the subdirectories and `.json` files under a registry path.
pub struct ListDirectoryTool {
    store: Arc<RegistryStore>,
}

impl ListDirectoryTool {
    pub const NAME: &'static str = "list_directory";

    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "List a directory of the MCP registry. Returns the names of its \
             subdirectories and JSON files. The root is '/'.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Registry directory, e.g. '/' or '/food/howtocook'"
                },
                "keyword": {
                    "type": "string",
                    "description": "Optional. Only keep subdirectories whose name contains this keyword"
                }
            },
            "required": ["path"]
        }))
    }

    fn validate(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        require_path(arguments)
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let path = path_arg(call)?;
        let listing = match call.str_arg("keyword").filter(|k| !k.is_empty()) {
            Some(keyword) => self.store.filter_list(path, keyword).await,
            None => self.store.list(path).await,
        };

        let output = match listing {
            Ok(structure) => serde_json::to_value(&structure)?,
            Err(e) => {
                debug!(path, error = %e, "list_directory failed");
                json!({"error": e.to_string(), "directories": [], "files": []})
            }
        };

        Ok(ToolResult::success(&call.id, output.to_string()))
    }
}

/// Reads one registry file: a descriptor, a server manifest, other JSON or
/// plain text.
pub struct ReadFileTool {
    store: Arc<RegistryStore>,
}

impl ReadFileTool {
    pub const NAME: &'static str = "read_file";

    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "Read a file of the MCP registry, such as a service's config.json or \
             an MCP server manifest under its mcp/ directory.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Full file path, e.g. '/food/howtocook/mcp/howtocook_mcp.json'"
                }
            },
            "required": ["path"]
        }))
    }

    fn validate(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        require_path(arguments)
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let path = path_arg(call)?;
        let output = match self.store.read(path).await {
            Ok(content) => content.render_pretty(),
            Err(e) => {
                debug!(path, error = %e, "read_file failed");
                json!({"error": e.to_string()}).to_string()
            }
        };

        Ok(ToolResult::success(&call.id, output))
    }
}

/// A registry holding the two exploration tools over `store`.
pub fn discovery_tools(store: Arc<RegistryStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListDirectoryTool::new(store.clone())));
    registry.register(Arc::new(ReadFileTool::new(store)));
    registry
}
