//! # conductor-tools
//!
//! Tools the model can call, and the registry that dispatches them.
//!
//! Tools implement the [`Tool`] trait and are registered with a
//! [`ToolRegistry`], which looks them up by name and times each execution.
//! The [`primitives`] module holds the two read-only tools used to explore
//! the descriptor registry during discovery.

use thiserror::Error;

pub mod primitives;
pub mod registry;

pub use primitives::{discovery_tools, ListDirectoryTool, ReadFileTool};
pub use registry::{Tool, ToolRegistry};

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool was not found in the registry.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Invalid arguments provided to the tool.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Required parameter is missing.
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    /// Operation timed out.
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic execution error.
    #[error("execution error: {0}")]
    Execution(String),
}

impl ToolError {
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    pub fn missing_param(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}

impl From<ToolError> for conductor_core::Error {
    fn from(err: ToolError) -> Self {
        conductor_core::Error::Tool(err.to_string())
    }
}
