//! # conductor-orchestrator
//!
//! The request pipeline that turns one free-form request into calls against
//! MCP tool servers and a single answer:
//!
//! 1. [`TaskDecomposer`] splits the request into sub-tasks.
//! 2. [`ToolDiscoveryAgent`] explores the registry for each sub-task.
//! 3. [`ExecutionPlanner`] binds sub-tasks to servers, tools and arguments.
//! 4. [`ExecutionEngine`] connects the servers and runs every planned call.
//! 5. [`ResponseSynthesizer`] folds the results into the final reply.
//!
//! [`Orchestrator`] sequences the stages and owns the per-request state.

pub mod context;
pub mod decomposer;
pub mod discovery;
pub mod error;
pub mod events;
pub mod execution;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod repair;
pub mod result_value;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod testing;

pub use context::{ContentCache, PipelineState, RequestContext};
pub use decomposer::TaskDecomposer;
pub use discovery::ToolDiscoveryAgent;
pub use error::{OrchestratorError, Result};
pub use execution::{ExecutionEngine, McpClientFactory, ToolClient, ToolClientFactory};
pub use events::{NoOpPipelineHandler, PipelineEventHandler};
pub use orchestrator::Orchestrator;
pub use planner::ExecutionPlanner;
pub use repair::{parse_with_repair, TryParse};
pub use result_value::ResultValue;
pub use synthesizer::{ResponseSynthesizer, TextStream};
pub use types::{
    DiscoveryResult, DiscoveryStatus, ExecutionPlan, McpCall, PlanItem, SubTask, TaskDecomposition,
};
