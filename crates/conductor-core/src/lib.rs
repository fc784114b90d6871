//! # conductor-core
//!
//! Core types and abstractions for Conductor, the MCP task orchestrator.
//!
//! This crate provides:
//! - Message and conversation primitives
//! - Tool definitions and tool-call types
//! - The registry data model (tool descriptors, transport configs)
//! - Configuration system
//! - Common error types
//! - A line-buffered SSE parser shared by HTTP clients

pub mod config;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod sse;
pub mod tool;

pub use config::Config;
pub use descriptor::{
    DescriptorError, FileStructure, Parameter, RegistryContent, ServerConfigSet, ToolDescriptor,
    TransportConfig, TransportKind,
};
pub use error::{Error, ProviderError, Result};
pub use message::{Content, Message, Role};
pub use tool::{ToolCall, ToolDefinition, ToolResult};
