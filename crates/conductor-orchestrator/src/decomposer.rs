//! Stage 1: split a request into sub-tasks.

use std::collections::HashSet;
use std::sync::Arc;

use conductor_core::Message;
use conductor_providers::{CompletionRequest, Provider};
use tracing::{debug, info, instrument};

use crate::error::{OrchestratorError, Result};
use crate::prompts;
use crate::repair::parse_with_repair;
use crate::types::TaskDecomposition;

/// Turns free text into a [`TaskDecomposition`] with one model call.
pub struct TaskDecomposer {
    provider: Arc<dyn Provider>,
}

impl TaskDecomposer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Decompose `user_input`. Output that is not a task list fails the
    /// request; there is no retry.
    #[instrument(skip(self, user_input))]
    pub async fn decompose(&self, user_input: &str) -> Result<TaskDecomposition> {
        info!("Decomposing request");

        let request = CompletionRequest::new(vec![Message::user(prompts::decomposition_prompt(user_input))]);
        let response = self.provider.complete(request).await.map_err(OrchestratorError::Provider)?;
        let raw = response.content;

        let decomposition: TaskDecomposition =
            parse_with_repair(&raw).ok_or_else(|| OrchestratorError::DecompositionParse {
                message: "no task list found in model output".to_string(),
                raw: raw.clone(),
            })?;

        let mut seen = HashSet::new();
        if let Some(task) = decomposition.sub_tasks.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(OrchestratorError::DecompositionParse {
                message: format!("duplicate sub-task id '{}'", task.id),
                raw,
            });
        }

        info!(count = decomposition.sub_tasks.len(), "Decomposition complete");
        for (i, task) in decomposition.sub_tasks.iter().enumerate() {
            debug!(index = i + 1, task_id = %task.id, goal = %task.goal, "Sub-task");
        }

        Ok(decomposition)
    }
}
