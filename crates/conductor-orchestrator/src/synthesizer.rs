//! Stage 5: one natural-language answer from all task results.

use std::collections::BTreeMap;
use std::sync::Arc;

use conductor_core::Message;
use conductor_providers::{CompletionRequest, Provider};
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{OrchestratorError, Result};
use crate::prompts;
use crate::result_value::ResultValue;

/// Stream of answer text deltas.
pub type TextStream = BoxStream<'static, Result<String>>;

pub struct ResponseSynthesizer {
    provider: Arc<dyn Provider>,
}

impl ResponseSynthesizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn synthesize(&self, user_input: &str, results: &BTreeMap<String, Value>) -> Result<String> {
        info!("Synthesizing final response");
        let response = self
            .provider
            .complete(Self::request(user_input, results))
            .await
            .map_err(OrchestratorError::Provider)?;
        Ok(response.content)
    }

    /// Like [`synthesize`](Self::synthesize), yielding the answer as it is
    /// generated.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn synthesize_stream(&self, user_input: &str, results: &BTreeMap<String, Value>) -> Result<TextStream> {
        info!("Streaming final response");
        let chunks = self
            .provider
            .complete_stream(Self::request(user_input, results))
            .await
            .map_err(OrchestratorError::Provider)?;

        Ok(chunks
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(chunk) => chunk.delta.filter(|d| !d.is_empty()).map(Ok),
                    Err(e) => Some(Err(OrchestratorError::Provider(e))),
                }
            })
            .boxed())
    }

    fn request(user_input: &str, results: &BTreeMap<String, Value>) -> CompletionRequest {
        let rendered = render_results(results);
        debug!(results = %rendered, "Execution results for synthesis");
        CompletionRequest::new(vec![Message::user(prompts::synthesis_prompt(user_input, &rendered))])
    }
}

/// Pretty JSON of the result map with every value normalized.
pub fn render_results(results: &BTreeMap<String, Value>) -> String {
    let normalized = ResultValue::Mapping(
        results
            .iter()
            .map(|(task_id, value)| (task_id.clone(), ResultValue::from(value)))
            .collect(),
    );
    serde_json::to_string_pretty(&normalized).unwrap_or_else(|_| normalized.to_json().to_string())
}
