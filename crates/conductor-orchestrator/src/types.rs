//! Data passed between pipeline stages.

use std::fmt;

use conductor_core::RegistryContent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One independently resolvable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub goal: String,
    /// Free-text hint about the kind of tool needed.
    #[serde(rename = "required_tool_type", alias = "required_capability", default)]
    pub required_capability: String,
    #[serde(default)]
    pub extracted_params: Map<String, Value>,
}

/// Output of the decomposition stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDecomposition {
    #[serde(default)]
    pub analysis: String,
    pub sub_tasks: Vec<SubTask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Found,
    NotFound,
    /// The exploration used its whole turn budget without answering.
    TurnLimitExceeded,
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::TurnLimitExceeded => "turn_limit_exceeded",
        };
        f.write_str(s)
    }
}

/// Where discovery located a sub-task's tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryResult {
    pub task_id: String,
    /// Registry path of the resolved file, empty when unresolved.
    pub mcp_path: String,
    pub status: DiscoveryStatus,
    /// Content of `mcp_path` as read right after discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RegistryContent>,
}

impl DiscoveryResult {
    pub fn found(task_id: impl Into<String>, mcp_path: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            mcp_path: mcp_path.into(),
            status: DiscoveryStatus::Found,
            snapshot: None,
        }
    }

    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::unresolved(task_id, DiscoveryStatus::NotFound)
    }

    pub fn turn_limit_exceeded(task_id: impl Into<String>) -> Self {
        Self::unresolved(task_id, DiscoveryStatus::TurnLimitExceeded)
    }

    fn unresolved(task_id: impl Into<String>, status: DiscoveryStatus) -> Self {
        Self {
            task_id: task_id.into(),
            mcp_path: String::new(),
            status,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<RegistryContent>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn is_found(&self) -> bool {
        self.status == DiscoveryStatus::Found && !self.mcp_path.is_empty()
    }
}

/// The server, tool and arguments chosen for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpCall {
    #[serde(default)]
    pub server_name: String,
    /// Empty or missing lets the execution agent pick a tool.
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl McpCall {
    /// The tool name, if one was actually chosen.
    pub fn tool(&self) -> Option<&str> {
        self.tool_name.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub task_id: String,
    #[serde(default)]
    pub mcp_to_execute: Option<McpCall>,
}

/// Output of the planning stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan: Vec<PlanItem>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}
