//! # conductor-agent
//!
//! The tool-calling loop shared by discovery and execution.
//!
//! This crate provides:
//! - [`Agent`], which alternates model turns and tool execution until the
//!   model answers without tool calls or the turn cap is hit
//! - [`ToolExecutor`], which runs one turn's tool calls concurrently

pub mod agent;
pub mod executor;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentError, AgentEventHandler, AgentResponse, AgentResult,
    NoOpEventHandler,
};
pub use executor::ToolExecutor;
