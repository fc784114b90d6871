//! Core agent implementation.
//!
//! An [`Agent`] owns one conversation. Each turn sends the conversation and
//! the executor's tool definitions to the provider; tool calls in the reply
//! are executed and their results appended, and the loop continues until the
//! model answers without tool calls.
//!
//! ```text
//! Agent
//! ├── Provider (LLM interaction)
//! ├── ToolExecutor (concurrent tool execution)
//! └── AgentEventHandler (tool progress callbacks)
//! ```
//!
//! The turn cap is explicit: a conversation that still asks for tools after
//! `max_turns` model turns fails with [`AgentError::MaxTurnsExceeded`].
//! Model name and sampling come from the provider's own defaults.

use std::sync::Arc;

use conductor_core::{Message, ToolCall, ToolResult};
use conductor_providers::{CompletionRequest, CompletionResponse, Provider};
use thiserror::Error;
use tracing::{debug, warn};

use crate::executor::ToolExecutor;

/// Errors that can occur during agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Error from the AI provider.
    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// The model kept calling tools past the turn cap.
    #[error("Maximum turns exceeded: {0}")]
    MaxTurnsExceeded(usize),

    /// Agent not properly configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    /// Maximum number of model turns.
    pub max_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_turns: 8,
        }
    }
}

/// Final response from the agent.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Text of the last assistant turn.
    pub content: String,
    pub turns: usize,
    /// The whole conversation, starting with the user input.
    pub messages: Vec<Message>,
}

/// Handler for tool activity during a run.
pub trait AgentEventHandler: Send + Sync {
    fn on_tool_start(&self, _call: &ToolCall) {}

    fn on_tool_complete(&self, _call: &ToolCall, _result: &ToolResult) {}
}

/// Default event handler that does nothing.
pub struct NoOpEventHandler;

impl AgentEventHandler for NoOpEventHandler {}

/// A tool-calling conversation with one provider.
pub struct Agent {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    config: AgentConfig,
    event_handler: Arc<dyn AgentEventHandler>,
    messages: Vec<Message>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: ToolExecutor,
        config: AgentConfig,
        event_handler: Arc<dyn AgentEventHandler>,
    ) -> Self {
        Self {
            provider,
            executor,
            config,
            event_handler,
            messages: Vec::new(),
        }
    }

    /// Add `input` as a user message and run the loop to completion.
    pub async fn run(&mut self, input: &str) -> AgentResult<AgentResponse> {
        self.messages.push(Message::user(input));

        for turn in 0..self.config.max_turns {
            debug!(turn, "Running agent turn");

            let response = self.step().await?;
            if response.tool_calls.is_empty() {
                return Ok(AgentResponse {
                    content: response.content,
                    turns: turn + 1,
                    messages: self.messages.clone(),
                });
            }
        }

        warn!(max_turns = self.config.max_turns, "Max turns exceeded");
        Err(AgentError::MaxTurnsExceeded(self.config.max_turns))
    }

    /// One completion plus execution of the tool calls it requests.
    async fn step(&mut self) -> AgentResult<CompletionResponse> {
        let mut request =
            CompletionRequest::new(self.messages.clone()).with_tools(self.executor.registry().definitions());
        request.system = self.config.system_prompt.clone();

        let response = self.provider.complete(request).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            tool_calls = response.tool_calls.len(),
            "Model turn complete"
        );

        self.messages
            .push(Message::assistant(&response.content).with_tool_calls(response.tool_calls.clone()));
        self.handle_tool_calls(&response.tool_calls).await;

        Ok(response)
    }

    async fn handle_tool_calls(&mut self, calls: &[ToolCall]) {
        for call in calls {
            self.event_handler.on_tool_start(call);
        }

        let results = self.executor.execute_batch(calls).await;

        for (call, result) in calls.iter().zip(&results) {
            self.event_handler.on_tool_complete(call, result);
            self.messages.push(Message::tool_result(
                result.tool_call_id.clone(),
                result.content(),
                !result.success,
            ));
        }
    }
}

/// Builder for constructing an [`Agent`].
pub struct AgentBuilder {
    provider: Option<Arc<dyn Provider>>,
    executor: ToolExecutor,
    config: AgentConfig,
    event_handler: Option<Arc<dyn AgentEventHandler>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            executor: ToolExecutor::default(),
            config: AgentConfig::default(),
            event_handler: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_turns(mut self, max: usize) -> Self {
        self.config.max_turns = max;
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn AgentEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the agent. A provider and a non-zero turn cap are required.
    pub fn build(self) -> AgentResult<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::NotConfigured("provider is required".into()))?;
        if self.config.max_turns == 0 {
            return Err(AgentError::NotConfigured("max_turns must be at least 1".into()));
        }
        let event_handler = self.event_handler.unwrap_or_else(|| Arc::new(NoOpEventHandler));

        Ok(Agent::new(provider, self.executor, self.config, event_handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::{Role, ToolDefinition};
    use conductor_providers::{ChunkStream, StreamChunk};
    use conductor_tools::{Tool, ToolError, ToolRegistry};
    use futures::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockProvider {
        responses: Mutex<Vec<CompletionResponse>>,
        requests: Mutex<Vec<CompletionRequest>>,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        fn with_tool_call(tool_name: &str, args: serde_json::Value, final_response: &str) -> Self {
            Self::new(vec![
                CompletionResponse::tool_calls(vec![ToolCall::new("call_1", tool_name, args)]),
                CompletionResponse::text(final_response),
            ])
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn id(&self) -> &str {
            "mock"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            Ok(responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| CompletionResponse::text("No more responses")))
        }

        async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
            let response = self.complete(request).await?;
            Ok(Box::pin(stream::iter(vec![Ok(StreamChunk {
                delta: Some(response.content),
                is_final: true,
            })])))
        }
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("upper", "Uppercase 'text'")
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
            let text = call.str_arg("text").ok_or_else(|| ToolError::missing_param("text"))?;
            Ok(ToolResult::success(&call.id, text.to_uppercase()))
        }
    }

    fn agent(provider: Arc<MockProvider>) -> Agent {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        AgentBuilder::new()
            .provider(provider)
            .executor(ToolExecutor::new(registry))
            .system_prompt("You are a test agent")
            .max_turns(4)
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct RecordingHandler {
        tools: Mutex<Vec<String>>,
        started: AtomicUsize,
    }

    impl AgentEventHandler for RecordingHandler {
        fn on_tool_start(&self, _call: &ToolCall) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_tool_complete(&self, call: &ToolCall, result: &ToolResult) {
            self.tools
                .lock()
                .unwrap()
                .push(format!("{}={}", call.name, result.content()));
        }
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.max_turns, 8);
        assert!(config.system_prompt.is_none());
    }

    #[tokio::test]
    async fn test_basic_run() {
        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text("Hello!")]));
        let mut agent = agent(Arc::clone(&provider));

        let response = agent.run("Hi").await.unwrap();
        assert_eq!(response.content, "Hello!");
        assert_eq!(response.turns, 1);
        assert_eq!(response.messages.len(), 2);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].system.as_deref(), Some("You are a test agent"));
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_results_feed_next_turn() {
        let provider = Arc::new(MockProvider::with_tool_call("upper", json!({"text": "abc"}), "done"));
        let handler = Arc::new(RecordingHandler::default());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UpperTool));
        let mut agent = AgentBuilder::new()
            .provider(provider.clone())
            .executor(ToolExecutor::new(registry))
            .event_handler(handler.clone())
            .build()
            .unwrap();

        let response = agent.run("shout abc").await.unwrap();
        assert_eq!(response.content, "done");
        assert_eq!(response.turns, 2);

        let roles: Vec<Role> = response.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(response.messages[2].tool_use_id(), Some("call_1"));

        // The second request carries the tool result.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].messages[2].text(), "ABC");

        assert_eq!(handler.started.load(Ordering::SeqCst), 1);
        assert_eq!(*handler.tools.lock().unwrap(), vec!["upper=ABC".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_tool_is_reported_not_fatal() {
        let provider = Arc::new(MockProvider::with_tool_call("upper", json!({}), "recovered"));
        let mut agent = agent(provider);

        let response = agent.run("go").await.unwrap();
        assert_eq!(response.content, "recovered");
        let tool_message = &response.messages[2];
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.text().contains("text"));
    }

    #[tokio::test]
    async fn test_builder_missing_provider() {
        let result = AgentBuilder::new().build();
        assert!(matches!(result, Err(AgentError::NotConfigured(_))));

        let provider = Arc::new(MockProvider::new(vec![]));
        let result = AgentBuilder::new().provider(provider).max_turns(0).build();
        assert!(matches!(result, Err(AgentError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_max_turns_exceeded() {
        let responses: Vec<CompletionResponse> = (0..15)
            .map(|i| {
                CompletionResponse::tool_calls(vec![ToolCall::new(
                    format!("call_{}", i),
                    "upper",
                    json!({"text": "again"}),
                )])
            })
            .collect();

        let provider = Arc::new(MockProvider::new(responses));
        let mut agent = agent(Arc::clone(&provider));

        let result = agent.run("Test").await;
        assert!(matches!(result, Err(AgentError::MaxTurnsExceeded(4))));
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        struct Failing;

        #[async_trait]
        impl Provider for Failing {
            fn id(&self) -> &str {
                "failing"
            }

            fn is_configured(&self) -> bool {
                false
            }

            async fn complete(&self, _request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
                anyhow::bail!("rate limited")
            }

            async fn complete_stream(&self, _request: CompletionRequest) -> anyhow::Result<ChunkStream> {
                anyhow::bail!("rate limited")
            }
        }

        let mut agent = AgentBuilder::new().provider(Arc::new(Failing)).build().unwrap();
        let err = agent.run("x").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(err.to_string(), "Provider error: rate limited");
    }
}
