//! Stage 3: bind sub-tasks to concrete MCP calls.

use std::sync::Arc;

use conductor_core::Message;
use conductor_providers::{CompletionRequest, Provider};
use tracing::{debug, info, instrument, warn};

use crate::error::{OrchestratorError, Result};
use crate::prompts::{self, PlanningContext};
use crate::repair::parse_with_repair;
use crate::types::ExecutionPlan;

/// Asks the model for an [`ExecutionPlan`] and repairs sloppy output.
pub struct ExecutionPlanner {
    provider: Arc<dyn Provider>,
}

impl ExecutionPlanner {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    #[instrument(skip_all, fields(tasks = contexts.len()))]
    pub async fn plan(&self, user_input: &str, contexts: &[PlanningContext<'_>]) -> Result<ExecutionPlan> {
        info!("Formulating execution plan");

        let prompt = prompts::execution_plan_prompt(user_input, contexts);
        let request = CompletionRequest::new(vec![Message::user(prompt)]);
        let response = self.provider.complete(request).await.map_err(OrchestratorError::Provider)?;

        Self::parse(&response.content)
    }

    /// Parse planner output, trying each repair strategy in turn.
    pub fn parse(raw: &str) -> Result<ExecutionPlan> {
        match parse_with_repair::<ExecutionPlan>(raw) {
            Some(plan) => {
                debug!(items = plan.len(), "Execution plan parsed");
                Ok(plan)
            }
            None => {
                warn!(output = %raw, "Could not parse execution plan");
                Err(OrchestratorError::PlanParse { raw: raw.to_string() })
            }
        }
    }
}
