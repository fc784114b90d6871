//! Shared fixtures for the pipeline tests: a scripted model, a tool-server
//! factory that never leaves the process, and a registry tree on disk.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conductor_core::{ToolCall, ToolDefinition, ToolResult, TransportConfig};
use conductor_orchestrator::{ToolClient, ToolClientFactory};
use conductor_providers::{ChunkStream, CompletionRequest, CompletionResponse, Provider, StreamChunk};
use conductor_tools::{Tool, ToolError, ToolRegistry};
use futures::stream;
use serde_json::json;
use tempfile::TempDir;

type Handler = Box<dyn Fn(&CompletionRequest) -> CompletionResponse + Send + Sync>;

pub struct ScriptedProvider {
    handler: Handler,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(handler: impl Fn(&CompletionRequest) -> CompletionResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let response = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> anyhow::Result<ChunkStream> {
        let text = self.complete(request).await?.content;
        let chunks: Vec<anyhow::Result<StreamChunk>> = text
            .chars()
            .map(|c| {
                Ok(StreamChunk {
                    delta: Some(c.to_string()),
                    is_final: false,
                })
            })
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Text of the first message of a request.
pub fn first_text(request: &CompletionRequest) -> String {
    request.messages.first().map(|m| m.text()).unwrap_or_default()
}

/// A weather tool exposed as if it came from the `amap-weather` server.
pub struct WeatherTool;

pub const WEATHER_TOOL: &str = "mcp__amap-weather__maps_weather";

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        WEATHER_TOOL
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(WEATHER_TOOL, "Weather for a city").with_parameters(json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }))
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let city = call.str_arg("city").ok_or_else(|| ToolError::missing_param("city"))?;
        Ok(ToolResult::success(&call.id, format!("{city}: 晴, 25°C")))
    }
}

struct LocalClient;

#[async_trait]
impl ToolClient for LocalClient {
    fn tools(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(WeatherTool));
        registry
    }

    async fn close(&self) {}
}

/// Records the server maps it is asked to connect.
#[derive(Default)]
pub struct LocalFactory {
    pub connected: Mutex<Vec<BTreeMap<String, TransportConfig>>>,
}

#[async_trait]
impl ToolClientFactory for LocalFactory {
    async fn connect(&self, servers: &BTreeMap<String, TransportConfig>) -> anyhow::Result<Arc<dyn ToolClient>> {
        self.connected.lock().unwrap().push(servers.clone());
        Ok(Arc::new(LocalClient))
    }
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// A small registry with weather, food and travel services.
pub fn registry() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "weather/amap-weather/config.json",
        r#"{"name": "高德天气", "description": "Weather forecasts for Chinese cities", "category": "weather"}"#,
    );
    write(
        root,
        "weather/amap-weather/mcp/amap_weather_mcp.json",
        r#"{"mcpServers": {"amap-weather": {"type": "streamable_http", "url": "https://mcp.amap.com/mcp"}}}"#,
    );
    write(
        root,
        "food/howtocook/config.json",
        r#"{"name": "HowToCook", "description": "Recipes and meal plans", "category": "food"}"#,
    );
    write(
        root,
        "food/howtocook/mcp/howtocook_mcp.json",
        r#"{"mcpServers": {"howtocook": {"command": "npx", "args": ["-y", "howtocook-mcp"]}}}"#,
    );
    dir
}
