//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use conductor_core::config::LlmConfig;
use conductor_core::sse::SseParser;
use conductor_core::{Message, ProviderError, Role, ToolCall, ToolDefinition};

use crate::traits::{
    ChunkStream, CompletionRequest, CompletionResponse, FinishReason, Provider, StreamChunk, Usage,
};

const PROVIDER_ID: &str = "openai";

/// Provider for any endpoint that speaks `/chat/completions`.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    /// Create a provider against the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.3,
        }
    }

    /// Build from the `[llm]` config section, resolving the key from the
    /// environment when the file does not set one.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config.resolve_api_key().ok_or_else(|| ProviderError::NotConfigured {
            provider: PROVIDER_ID.to_string(),
            env_var: Some("LLM_API_KEY".to_string()),
        })?;

        Ok(Self::new(api_key)
            .with_base_url(&config.base_url)
            .with_default_model(&config.model)
            .with_sampling(config.max_tokens, config.temperature))
    }

    /// Set a custom base URL (DashScope, gateways, local servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sampling settings for requests that leave them unset.
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn convert_message(message: &Message) -> ApiMessage {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        tool_type: "function".to_string(),
                        function: ApiFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        ApiMessage {
            role: message.role.as_str().to_string(),
            content: Some(message.text()),
            tool_calls,
            tool_call_id: if message.role == Role::Tool {
                message.tool_use_id().map(str::to_string)
            } else {
                None
            },
        }
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ApiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(Self::convert_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(format_tools(&request.tools))
        };

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        ApiRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens.unwrap_or(self.max_tokens)),
            temperature: Some(request.temperature.unwrap_or(self.temperature)),
            tools,
            stream,
        }
    }

    async fn send(&self, body: &ApiRequest) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completion error: {} - {}", status, error_text);
            return Err(ProviderError::api_error(PROVIDER_ID, status.as_u16(), error_text).into());
        }

        Ok(response)
    }

    fn parse_response(response: ApiResponse) -> CompletionResponse {
        let choice = response.choices.into_iter().next();

        let (content, tool_calls, finish_reason) = match choice {
            Some(choice) => {
                let tool_calls = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| {
                        let arguments = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or(serde_json::Value::Object(Default::default()));
                        ToolCall::new(tc.id, tc.function.name, arguments)
                    })
                    .collect();
                (
                    choice.message.content.unwrap_or_default(),
                    tool_calls,
                    parse_finish_reason(choice.finish_reason.as_deref()),
                )
            }
            None => (String::new(), Vec::new(), FinishReason::Stop),
        };

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        CompletionResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        debug!(messages = body.messages.len(), tools = request.tools.len(), "Sending chat completion");

        let response = self.send(&body).await?;
        let api_response: ApiResponse = response.json().await?;
        Ok(Self::parse_response(api_response))
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
        let body = self.build_request(&request, true);
        debug!(messages = body.messages.len(), "Sending streaming chat completion");

        let response = self.send(&body).await?;
        let byte_stream = response.bytes_stream();

        // Chunks may carry zero or several events; queue the surplus.
        let parsed = stream::unfold(
            (byte_stream, SseParser::new(), Vec::<StreamChunk>::new(), false),
            |(mut bytes, mut parser, mut pending, mut done)| async move {
                loop {
                    if !pending.is_empty() {
                        let chunk = pending.remove(0);
                        return Some((Ok(chunk), (bytes, parser, pending, done)));
                    }
                    if done {
                        return None;
                    }

                    match bytes.next().await {
                        Some(Ok(data)) => {
                            for event in parser.feed(&data) {
                                if event.is_done() {
                                    pending.push(StreamChunk {
                                        delta: None,
                                        is_final: true,
                                    });
                                    done = true;
                                    break;
                                }
                                match parse_stream_event(&event.data) {
                                    Ok(Some(chunk)) => pending.push(chunk),
                                    Ok(None) => {}
                                    Err(e) => warn!("Failed to parse SSE event: {}", e),
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let err = ProviderError::StreamError {
                                provider: PROVIDER_ID.to_string(),
                                message: e.to_string(),
                            };
                            return Some((Err(anyhow::Error::from(err)), (bytes, parser, pending, true)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(parsed))
    }
}

fn format_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|t| ApiTool {
            tool_type: "function".to_string(),
            function: ApiFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::MaxTokens,
        Some("tool_calls") => FinishReason::ToolUse,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn parse_stream_event(data: &str) -> anyhow::Result<Option<StreamChunk>> {
    let chunk: StreamChunkResponse = serde_json::from_str(data)?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let delta = choice.delta.and_then(|d| d.content).filter(|c| !c.is_empty());
    let is_final = choice.finish_reason.is_some();

    if delta.is_some() || is_final {
        Ok(Some(StreamChunk { delta, is_final }))
    } else {
        Ok(None)
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    tool_type: String,
    function: ApiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunkResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
