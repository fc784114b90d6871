//! Stage 2: find a registry file for each sub-task.
//!
//! Each sub-task gets its own agent conversation armed with the two registry
//! primitives. The agent's last answer must contain a JSON object naming the
//! chosen path. Every failure along the way degrades to an unresolved
//! [`DiscoveryResult`]; nothing here aborts the pipeline.

use std::sync::Arc;

use conductor_agent::{AgentBuilder, AgentError, AgentResult, ToolExecutor};
use conductor_providers::Provider;
use conductor_registry::RegistryStore;
use conductor_tools::discovery_tools;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::events::{NoOpPipelineHandler, PipelineEventHandler, TaskToolEvents};
use crate::prompts;
use crate::types::{DiscoveryResult, SubTask};

static ANSWER_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]+\}").expect("valid regex"));

/// Final answer of the exploration agent.
#[derive(Debug, Deserialize)]
struct DiscoveryAnswer {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    mcp_path: String,
    #[serde(default)]
    status: Option<String>,
}

/// Explores the registry on behalf of sub-tasks.
pub struct ToolDiscoveryAgent {
    provider: Arc<dyn Provider>,
    store: Arc<RegistryStore>,
    max_turns: usize,
    events: Arc<dyn PipelineEventHandler>,
}

impl ToolDiscoveryAgent {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<RegistryStore>, max_turns: usize) -> Self {
        Self {
            provider,
            store,
            max_turns,
            events: Arc::new(NoOpPipelineHandler),
        }
    }

    /// Report each exploration step to `events`.
    pub fn with_event_handler(mut self, events: Arc<dyn PipelineEventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Resolve one sub-task.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn discover(&self, task: &SubTask) -> DiscoveryResult {
        info!(goal = %task.goal, "Discovering tool");

        let answer = match self.explore(task).await {
            Ok(answer) => answer,
            Err(AgentError::MaxTurnsExceeded(turns)) => {
                warn!(turns, "Discovery ran out of turns");
                return DiscoveryResult::turn_limit_exceeded(&task.id);
            }
            Err(e) => {
                warn!(error = %e, "Discovery failed");
                return DiscoveryResult::not_found(&task.id);
            }
        };

        let Some(path) = Self::parse_answer(&task.id, &answer) else {
            return DiscoveryResult::not_found(&task.id);
        };

        let snapshot = match self.store.read(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(path = %path, error = %e, "Could not load snapshot of discovered file");
                None
            }
        };

        info!(path = %path, "Tool discovered");
        DiscoveryResult::found(&task.id, path).with_snapshot(snapshot)
    }

    /// Resolve every sub-task concurrently; results keep the input order.
    pub async fn discover_all(&self, tasks: &[SubTask]) -> Vec<DiscoveryResult> {
        join_all(tasks.iter().map(|task| self.discover(task))).await
    }

    async fn explore(&self, task: &SubTask) -> AgentResult<String> {
        let mut agent = AgentBuilder::new()
            .provider(Arc::clone(&self.provider))
            .executor(ToolExecutor::new(discovery_tools(Arc::clone(&self.store))))
            .system_prompt(prompts::DISCOVERY_SYSTEM_PROMPT)
            .max_turns(self.max_turns)
            .event_handler(TaskToolEvents::new(&task.id, &self.events))
            .build()?;

        let response = agent.run(&prompts::discovery_prompt(task)).await?;
        debug!(turns = response.turns, "Discovery conversation finished");
        Ok(response.content)
    }

    /// The path reported in `answer`, or `None` when the answer carries no
    /// usable JSON object, reports nothing found, or names a path that
    /// leaves the registry.
    pub fn parse_answer(task_id: &str, answer: &str) -> Option<String> {
        let Some(object) = ANSWER_OBJECT.find(answer) else {
            warn!(task_id, "Discovery answer contains no JSON object");
            return None;
        };

        let parsed: DiscoveryAnswer = match serde_json::from_str(object.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(task_id, error = %e, "Discovery answer is not valid JSON");
                return None;
            }
        };

        if let Some(reported) = parsed.task_id.as_deref().filter(|id| *id != task_id) {
            debug!(task_id, reported, "Discovery answer names another task id");
        }

        let status = parsed.status.as_deref().unwrap_or("found");
        let path = parsed.mcp_path.trim();
        if status == "not_found" || path.is_empty() {
            debug!(task_id, status, "No tool found");
            return None;
        }
        if let Err(e) = RegistryStore::normalize(path) {
            warn!(task_id, path, error = %e, "Discovery answer points outside the registry");
            return None;
        }

        Some(path.to_string())
    }
}
