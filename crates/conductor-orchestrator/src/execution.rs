//! Stage 4: run the plan against live tool servers.
//!
//! Discovery results are first merged into one transport map. A single
//! multi-server client is built from it, and every plan item runs
//! concurrently through its own agent conversation over the shared tool
//! set. Failures stay inside the item they happened in.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use conductor_agent::{AgentBuilder, ToolExecutor};
use conductor_core::{RegistryContent, TransportConfig};
use conductor_mcp::{register_mcp_tools, McpClient, MCP_TOOL_PREFIX};
use conductor_providers::Provider;
use conductor_registry::RegistryStore;
use conductor_tools::ToolRegistry;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::context::ContentCache;
use crate::events::{NoOpPipelineHandler, PipelineEventHandler, TaskToolEvents};
use crate::prompts;
use crate::result_value::ResultValue;
use crate::types::{DiscoveryResult, ExecutionPlan, McpCall, PlanItem, SubTask};

pub const NO_CONFIGURATION: &str = "no configuration found";
pub const SERVER_CONFIG_NOT_FOUND: &str = "server config not found";

/// A connected set of tool servers.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Every tool the servers expose.
    fn tools(&self) -> ToolRegistry;

    async fn close(&self);
}

/// Builds a [`ToolClient`] for a merged transport map.
#[async_trait]
pub trait ToolClientFactory: Send + Sync {
    async fn connect(&self, servers: &BTreeMap<String, TransportConfig>) -> anyhow::Result<Arc<dyn ToolClient>>;
}

/// Connects through `conductor-mcp`.
#[derive(Debug, Default)]
pub struct McpClientFactory;

struct McpToolClient {
    client: Arc<McpClient>,
    tools: ToolRegistry,
}

#[async_trait]
impl ToolClient for McpToolClient {
    fn tools(&self) -> ToolRegistry {
        self.tools.clone()
    }

    async fn close(&self) {
        self.client.disconnect_all().await;
    }
}

#[async_trait]
impl ToolClientFactory for McpClientFactory {
    async fn connect(&self, servers: &BTreeMap<String, TransportConfig>) -> anyhow::Result<Arc<dyn ToolClient>> {
        let client = Arc::new(McpClient::new());
        client.connect_all(servers).await?;

        let mut tools = ToolRegistry::new();
        register_mcp_tools(Arc::clone(&client), &mut tools).await;
        Ok(Arc::new(McpToolClient { client, tools }))
    }
}

/// Merges configs and runs plans.
pub struct ExecutionEngine {
    provider: Arc<dyn Provider>,
    store: Arc<RegistryStore>,
    factory: Arc<dyn ToolClientFactory>,
    default_server_url: String,
    max_turns: usize,
    active: Mutex<Vec<Arc<dyn ToolClient>>>,
    events: Arc<dyn PipelineEventHandler>,
}

impl ExecutionEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<RegistryStore>,
        factory: Arc<dyn ToolClientFactory>,
        default_server_url: impl Into<String>,
        max_turns: usize,
    ) -> Self {
        Self {
            provider,
            store,
            factory,
            default_server_url: default_server_url.into(),
            max_turns,
            active: Mutex::new(Vec::new()),
            events: Arc::new(NoOpPipelineHandler),
        }
    }

    /// Report each tool call made by the execution agents to `events`.
    pub fn with_event_handler(mut self, events: Arc<dyn PipelineEventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Build the server map for a set of discovery results.
    ///
    /// The first definition of a server name wins; later duplicates are
    /// ignored.
    pub async fn merge_config(
        &self,
        discoveries: &[DiscoveryResult],
        cache: &mut ContentCache,
    ) -> BTreeMap<String, TransportConfig> {
        let mut servers = BTreeMap::new();
        for discovery in discoveries {
            let Some(content) = cache.load(&self.store, discovery).await else {
                continue;
            };
            self.merge_content(&mut servers, &content, &discovery.task_id);
        }
        debug!(servers = ?servers.keys().collect::<Vec<_>>(), "Merged server config");
        servers
    }

    fn merge_content(&self, servers: &mut BTreeMap<String, TransportConfig>, content: &RegistryContent, task_id: &str) {
        match content {
            RegistryContent::Descriptor(descriptor) => {
                servers
                    .entry(descriptor.name.clone())
                    .or_insert_with(|| descriptor.transport_or_default(&self.default_server_url));
            }
            RegistryContent::ServerSet(set) => {
                for (name, config) in &set.servers {
                    servers.entry(name.clone()).or_insert_with(|| config.clone());
                }
            }
            RegistryContent::Json(Value::Object(object)) => {
                let Some(raw) = object.get("server_config").filter(|v| v.is_object()) else {
                    return;
                };
                let name = object
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .unwrap_or(task_id);
                match TransportConfig::from_value(raw) {
                    Ok(config) => {
                        servers.entry(name.to_string()).or_insert(config);
                    }
                    Err(e) => warn!(task_id, server = name, error = %e, "Ignoring unusable server_config"),
                }
            }
            _ => debug!(task_id, "Content carries no server config"),
        }
    }

    /// Run every plan item and return one result per task id.
    #[instrument(skip_all, fields(items = plan.len(), servers = servers.len()))]
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        servers: &BTreeMap<String, TransportConfig>,
        tasks: &HashMap<String, SubTask>,
        discoveries: &HashMap<String, DiscoveryResult>,
    ) -> BTreeMap<String, Value> {
        let mut results = if servers.is_empty() {
            warn!("No MCP server configuration available");
            Self::uniform(plan, NO_CONFIGURATION.to_string())
        } else {
            self.run_plan(plan, servers, tasks).await
        };

        for (task_id, result) in results.iter_mut() {
            let path = discoveries.get(task_id).map(|d| d.mcp_path.as_str()).unwrap_or_default();
            if let Some(name) = self.config_name(path).await {
                if let Value::Object(object) = result {
                    object.insert("config_name".to_string(), Value::String(name));
                }
            }
        }

        results
    }

    async fn run_plan(
        &self,
        plan: &ExecutionPlan,
        servers: &BTreeMap<String, TransportConfig>,
        tasks: &HashMap<String, SubTask>,
    ) -> BTreeMap<String, Value> {
        info!("Connecting MCP servers");
        let client = match self.factory.connect(servers).await {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "MCP client initialization failed");
                return Self::uniform(plan, format!("MCP client initialization failed: {e}"));
            }
        };
        self.active.lock().await.push(Arc::clone(&client));

        let tools = client.tools();
        info!(tools = tools.len(), "Tools available");

        let outcomes = join_all(plan.plan.iter().map(|item| {
            let goal = tasks.get(&item.task_id).map(|t| t.goal.as_str()).unwrap_or_default();
            self.run_item(item, servers, &tools, goal)
        }))
        .await;

        self.release(&client).await;

        plan.plan
            .iter()
            .map(|item| item.task_id.clone())
            .zip(outcomes)
            .collect()
    }

    #[instrument(skip_all, fields(task_id = %item.task_id))]
    async fn run_item(
        &self,
        item: &PlanItem,
        servers: &BTreeMap<String, TransportConfig>,
        tools: &ToolRegistry,
        goal: &str,
    ) -> Value {
        let Some(call) = &item.mcp_to_execute else {
            warn!("Plan item has no MCP call");
            return error_value("plan item has no MCP call");
        };
        let server = call.server_name.trim();
        if server.is_empty() {
            warn!("Plan item names no MCP server");
            return error_value("plan item names no MCP server");
        }
        if !servers.contains_key(server) {
            warn!(server, "No config for planned server");
            return error_value(SERVER_CONFIG_NOT_FOUND);
        }

        let message = instruction(goal, call);
        debug!(message = %message, "Executing task");

        let agent = AgentBuilder::new()
            .provider(Arc::clone(&self.provider))
            .executor(ToolExecutor::new(tools.clone()))
            .system_prompt(prompts::EXECUTION_SYSTEM_PROMPT)
            .max_turns(self.max_turns)
            .event_handler(TaskToolEvents::new(&item.task_id, &self.events))
            .build();

        let outcome = match agent {
            Ok(mut agent) => agent.run(&message).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(response) => {
                info!(turns = response.turns, "Task executed");
                json!({ "response": ResultValue::conversation(&response.messages).to_json() })
            }
            Err(e) => {
                error!(error = %e, "Task execution failed");
                error_value(e.to_string())
            }
        }
    }

    /// `name` from the `config.json` (or `config.txt`) of the service that
    /// holds `mcp_path`.
    pub async fn config_name(&self, mcp_path: &str) -> Option<String> {
        let segments: Vec<&str> = mcp_path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }
        let service_dir = segments[..segments.len().saturating_sub(2)].join("/");

        for file in ["config.json", "config.txt"] {
            let path = if service_dir.is_empty() {
                file.to_string()
            } else {
                format!("{service_dir}/{file}")
            };
            if let Ok(content) = self.store.read(&path).await {
                if let Some(name) = content.name() {
                    return Some(name.to_string());
                }
            }
        }
        None
    }

    /// Disconnect any client left behind by an interrupted run.
    pub async fn close(&self) {
        let clients: Vec<_> = self.active.lock().await.drain(..).collect();
        for client in clients {
            client.close().await;
        }
    }

    async fn release(&self, client: &Arc<dyn ToolClient>) {
        self.active.lock().await.retain(|c| !Arc::ptr_eq(c, client));
        client.close().await;
    }

    fn uniform(plan: &ExecutionPlan, message: String) -> BTreeMap<String, Value> {
        plan.plan
            .iter()
            .map(|item| (item.task_id.clone(), error_value(message.clone())))
            .collect()
    }
}

fn error_value(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_params(arguments: &Map<String, Value>) -> String {
    if arguments.is_empty() {
        return "none".to_string();
    }
    arguments
        .iter()
        .map(|(key, value)| format!("{key}={}", display_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The user turn that asks the execution agent to perform one call.
pub fn instruction(goal: &str, call: &McpCall) -> String {
    let goal_line = if goal.is_empty() {
        String::new()
    } else {
        format!("Task goal: {goal}\n")
    };
    let server = call.server_name.trim();
    let params = render_params(&call.arguments);

    match call.tool() {
        Some(tool) => format!(
            "{goal_line}Call tool `{tool}` on MCP server `{server}` (available as `{MCP_TOOL_PREFIX}{server}__{tool}`), parameters: {params}. Return the result."
        ),
        None => format!(
            "{goal_line}Choose the most suitable tool on MCP server `{server}` to complete the task, suggested parameters: {params}. Return the result when done."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use conductor_core::{ToolCall, ToolDefinition, ToolResult, TransportKind};
    use conductor_providers::CompletionResponse;
    use conductor_tools::{Tool, ToolError};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "mcp__amap__maps_weather"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("mcp__amap__maps_weather", "Weather by city")
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
            let city = call.str_arg("city").unwrap_or("?");
            Ok(ToolResult::success(&call.id, format!("{city}: 晴")))
        }
    }

    struct FakeClient {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolClient for FakeClient {
        fn tools(&self) -> ToolRegistry {
            let mut registry = ToolRegistry::new();
            registry.register(Arc::new(EchoTool));
            registry
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        fail: bool,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolClientFactory for FakeFactory {
        async fn connect(&self, _servers: &BTreeMap<String, TransportConfig>) -> anyhow::Result<Arc<dyn ToolClient>> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(Arc::new(FakeClient {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    fn registry() -> (TempDir, Arc<RegistryStore>) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("weather/amap/mcp")).unwrap();
        fs::write(root.join("weather/amap/config.json"), r#"{"name": "高德天气", "description": "d"}"#).unwrap();
        fs::write(
            root.join("weather/amap/mcp/amap.json"),
            r#"{"mcpServers": {"amap": {"type": "streamable_http", "url": "https://a"}}}"#,
        )
        .unwrap();
        fs::write(
            root.join("weather/amap/mcp/amap_mirror.json"),
            r#"{"mcpServers": {"amap": {"command": "mirror"}, "backup": {"url": "https://b"}}}"#,
        )
        .unwrap();
        fs::write(
            root.join("weather/amap/mcp/forecast.json"),
            r#"{"name": "forecast", "description": "d", "category": "weather", "api_endpoint": "/f"}"#,
        )
        .unwrap();
        fs::write(
            root.join("weather/amap/mcp/custom.json"),
            r#"{"server_config": {"type": "streamable_http", "url": "https://c", "timeout": null}}"#,
        )
        .unwrap();
        let store = Arc::new(RegistryStore::new(root).unwrap());
        (dir, store)
    }

    fn engine(store: Arc<RegistryStore>, factory: FakeFactory) -> ExecutionEngine {
        let provider = ScriptedProvider::new(|request| {
            if request.messages.len() == 1 {
                CompletionResponse::tool_calls(vec![ToolCall::new(
                    "call_1",
                    "mcp__amap__maps_weather",
                    serde_json::json!({"city": "北京"}),
                )])
            } else {
                CompletionResponse::text("北京今天晴")
            }
        });
        ExecutionEngine::new(Arc::new(provider), store, Arc::new(factory), "http://localhost:8000/mcp/", 4)
    }

    fn plan(value: Value) -> ExecutionPlan {
        serde_json::from_value(value).unwrap()
    }

    fn found(task_id: &str, path: &str) -> DiscoveryResult {
        DiscoveryResult::found(task_id, path)
    }

    #[tokio::test]
    async fn test_merge_first_definition_wins() {
        let (_dir, store) = registry();
        let engine = engine(store, FakeFactory::default());
        let mut cache = ContentCache::new();

        let servers = engine
            .merge_config(
                &[
                    found("t1", "/weather/amap/mcp/amap.json"),
                    found("t2", "/weather/amap/mcp/amap_mirror.json"),
                    DiscoveryResult::not_found("t3"),
                ],
                &mut cache,
            )
            .await;

        assert_eq!(servers.len(), 2);
        assert_eq!(servers["amap"].url.as_deref(), Some("https://a"));
        assert_eq!(servers["backup"].transport, TransportKind::StreamableHttp);
    }

    #[tokio::test]
    async fn test_merge_descriptor_and_generic_server_config() {
        let (_dir, store) = registry();
        let engine = engine(store, FakeFactory::default());
        let mut cache = ContentCache::new();

        let servers = engine
            .merge_config(
                &[
                    found("t1", "/weather/amap/mcp/forecast.json"),
                    found("t2", "/weather/amap/mcp/custom.json"),
                    found("t3", "/weather/amap/config.json"),
                    found("t4", "/weather/amap/mcp/gone.json"),
                ],
                &mut cache,
            )
            .await;

        assert_eq!(servers["forecast"].url.as_deref(), Some("http://localhost:8000/mcp/forecast"));
        assert_eq!(servers["t2"].url.as_deref(), Some("https://c"));
        assert_eq!(servers.len(), 2);
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_config_fails_every_item() {
        let (_dir, store) = registry();
        let factory = FakeFactory::default();
        let closed = Arc::clone(&factory.closed);
        let engine = engine(store, factory);
        let plan = plan(json!({"plan": [{"task_id": "a"}, {"task_id": "b"}]}));

        let results = engine.execute(&plan, &BTreeMap::new(), &HashMap::new(), &HashMap::new()).await;

        assert_eq!(results["a"], json!({"error": NO_CONFIGURATION}));
        assert_eq!(results["b"], json!({"error": NO_CONFIGURATION}));
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_client_failure_is_uniform() {
        let (_dir, store) = registry();
        let engine = engine(
            store,
            FakeFactory {
                fail: true,
                ..Default::default()
            },
        );
        let plan = plan(json!({"plan": [{"task_id": "a", "mcp_to_execute": {"server_name": "amap"}}]}));
        let servers = BTreeMap::from([("amap".to_string(), TransportConfig::http("https://a"))]);

        let results = engine.execute(&plan, &servers, &HashMap::new(), &HashMap::new()).await;

        assert_eq!(
            results["a"]["error"],
            "MCP client initialization failed: connection refused"
        );
    }

    #[tokio::test]
    async fn test_items_are_isolated() {
        let (_dir, store) = registry();
        let factory = FakeFactory::default();
        let closed = Arc::clone(&factory.closed);
        let engine = engine(store, factory);
        let plan = plan(json!({"plan": [
            {"task_id": "task_001", "mcp_to_execute": {"server_name": "amap", "tool_name": "maps_weather", "arguments": {"city": "北京"}}},
            {"task_id": "task_002", "mcp_to_execute": {"server_name": "nowhere", "tool_name": "x"}},
            {"task_id": "task_003", "mcp_to_execute": {"server_name": "amap"}}
        ]}));
        let servers = BTreeMap::from([("amap".to_string(), TransportConfig::http("https://a"))]);
        let discoveries = HashMap::from([(
            "task_001".to_string(),
            found("task_001", "/weather/amap/mcp/amap.json"),
        )]);

        let results = engine.execute(&plan, &servers, &HashMap::new(), &discoveries).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["task_002"], json!({"error": SERVER_CONFIG_NOT_FOUND}));

        let conversation = results["task_001"]["response"].as_array().unwrap();
        assert_eq!(conversation.last().unwrap()["content"], "北京今天晴");
        assert!(conversation.iter().any(|m| m["content"] == "北京: 晴"));
        assert_eq!(results["task_001"]["config_name"], "高德天气");
        assert!(results["task_003"]["response"].is_array());
        assert!(results["task_003"].get("config_name").is_none());

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        engine.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_config_name_lookup() {
        let (_dir, store) = registry();
        let engine = engine(store, FakeFactory::default());

        assert_eq!(
            engine.config_name("/weather/amap/mcp/amap.json").await.as_deref(),
            Some("高德天气")
        );
        assert_eq!(engine.config_name("/food/none/mcp/x.json").await, None);
        assert_eq!(engine.config_name("").await, None);
    }

    #[test]
    fn test_instruction_text() {
        let with_tool: McpCall = serde_json::from_value(json!({
            "server_name": "amap", "tool_name": "maps_weather", "arguments": {"city": "北京", "days": 3}
        }))
        .unwrap();
        assert_eq!(
            instruction("查询北京天气", &with_tool),
            "Task goal: 查询北京天气\nCall tool `maps_weather` on MCP server `amap` (available as `mcp__amap__maps_weather`), parameters: city=北京, days=3. Return the result."
        );

        let without_tool: McpCall = serde_json::from_value(json!({"server_name": "howtocook"})).unwrap();
        let text = instruction("", &without_tool);
        assert!(text.starts_with("Choose the most suitable tool on MCP server `howtocook`"));
        assert!(text.contains("suggested parameters: none."));
    }
}
