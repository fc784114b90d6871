//! Pipeline errors.
//!
//! Only hard failures live here. Per-task problems during discovery and
//! execution are recorded in the results and never surface as an error.

use conductor_agent::AgentError;
use conductor_registry::RegistryError;
use thiserror::Error;

use crate::context::PipelineState;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The decomposition reply was not a task list.
    #[error("failed to parse task decomposition: {message}")]
    DecompositionParse { message: String, raw: String },

    /// No repair strategy produced a valid execution plan.
    #[error("failed to parse execution plan")]
    PlanParse { raw: String },

    /// A model call failed.
    #[error("provider error: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The pipeline was asked to move somewhere other than the next stage.
    #[error("illegal pipeline transition from {from} to {to}")]
    IllegalTransition { from: PipelineState, to: PipelineState },
}

impl OrchestratorError {
    /// Raw model output attached to a parse failure.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::DecompositionParse { raw, .. } | Self::PlanParse { raw } => Some(raw),
            _ => None,
        }
    }
}

impl From<OrchestratorError> for conductor_core::Error {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Registry(e) => e.into(),
            OrchestratorError::Provider(e) | OrchestratorError::Agent(AgentError::Provider(e)) => {
                match e.downcast::<conductor_core::ProviderError>() {
                    Ok(provider) => conductor_core::Error::Provider(provider),
                    Err(other) => conductor_core::Error::Pipeline(format!("provider error: {other}")),
                }
            }
            other => conductor_core::Error::Pipeline(other.to_string()),
        }
    }
}
