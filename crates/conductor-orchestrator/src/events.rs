//! Progress callbacks for a pipeline run.

use std::collections::BTreeMap;
use std::sync::Arc;

use conductor_agent::AgentEventHandler;
use conductor_core::{ToolCall, ToolResult};
use serde_json::Value;

use crate::context::PipelineState;
use crate::types::{DiscoveryResult, ExecutionPlan, TaskDecomposition};

/// Progress callbacks, called as each stage completes.
///
/// Tool callbacks fire from inside the concurrent discovery and execution
/// agents, tagged with the sub-task they belong to.
pub trait PipelineEventHandler: Send + Sync {
    fn on_state(&self, _state: PipelineState) {}

    fn on_decomposed(&self, _decomposition: &TaskDecomposition) {}

    fn on_discovered(&self, _results: &[DiscoveryResult]) {}

    fn on_planned(&self, _plan: &ExecutionPlan) {}

    fn on_executed(&self, _results: &BTreeMap<String, Value>) {}

    fn on_tool_call(&self, _task_id: &str, _call: &ToolCall) {}

    fn on_tool_result(&self, _task_id: &str, _call: &ToolCall, _result: &ToolResult) {}
}

/// Event handler that does nothing.
pub struct NoOpPipelineHandler;

impl PipelineEventHandler for NoOpPipelineHandler {}

/// Forwards one agent's tool activity to the pipeline handler.
pub(crate) struct TaskToolEvents {
    task_id: String,
    events: Arc<dyn PipelineEventHandler>,
}

impl TaskToolEvents {
    pub(crate) fn new(task_id: impl Into<String>, events: &Arc<dyn PipelineEventHandler>) -> Arc<Self> {
        Arc::new(Self {
            task_id: task_id.into(),
            events: Arc::clone(events),
        })
    }
}

impl AgentEventHandler for TaskToolEvents {
    fn on_tool_start(&self, call: &ToolCall) {
        self.events.on_tool_call(&self.task_id, call);
    }

    fn on_tool_complete(&self, call: &ToolCall, result: &ToolResult) {
        self.events.on_tool_result(&self.task_id, call, result);
    }
}
