//! # conductor-mcp
//!
//! MCP (Model Context Protocol) client support for Conductor.
//!
//! This crate provides:
//! - JSON-RPC and MCP protocol types
//! - stdio and HTTP transports, chosen from a registry [`TransportConfig`]
//! - a per-server [`McpConnection`] and a multi-server [`McpClient`]
//! - [`McpToolWrapper`], exposing server tools through the `Tool` trait
//! - [`EndpointExecutor`], calling a descriptor's own HTTP endpoint directly
//!
//! [`TransportConfig`]: conductor_core::TransportConfig

pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod tools;
pub mod transport;

pub use client::{ConnectionState, McpClient, McpConnection};
pub use endpoint::EndpointExecutor;
pub use error::{EndpointError, McpError, TransportError};
pub use tools::{register_mcp_tools, McpToolWrapper, MCP_TOOL_PREFIX};
pub use transport::{connect_transport, HttpTransport, StdioTransport, Transport};
