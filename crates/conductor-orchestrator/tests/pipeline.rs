mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use common::{first_text, LocalFactory, ScriptedProvider, WEATHER_TOOL};
use conductor_core::{Config, ToolCall};
use conductor_orchestrator::prompts::{DISCOVERY_SYSTEM_PROMPT, EXECUTION_SYSTEM_PROMPT};
use conductor_orchestrator::{
    DiscoveryResult, DiscoveryStatus, ExecutionPlan, Orchestrator, OrchestratorError, PipelineEventHandler,
    PipelineState, TaskDecomposition,
};
use conductor_providers::{CompletionRequest, CompletionResponse};
use conductor_registry::RegistryStore;
use futures::TryStreamExt;
use serde_json::{json, Value};

const WEATHER_REQUEST: &str = "找一个能查询北京天气的工具并调用";

const DECOMPOSITION: &str = r#"{
  "analysis": "用户需要查询北京的天气",
  "sub_tasks": [
    {"id": "task_001", "goal": "查询北京今天的天气", "required_tool_type": "weather forecast", "extracted_params": {"city": "北京"}}
  ]
}"#;

const PLAN: &str = r#"```json
{
  "plan": [
    {
      "task_id": "task_001",
      "mcp_to_execute": {
        "server_name": "amap-weather", // from mcpServers
        "tool_name": "maps_weather",
        "arguments": {"city": "北京"},
      }
    }
  ]
}
```"#;

const ANSWER: &str = "北京今天晴，气温 25°C（数据来自 @高德天气）。";

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<PipelineState>>,
    decomposition: Mutex<Option<TaskDecomposition>>,
    discoveries: Mutex<Vec<DiscoveryResult>>,
    plan: Mutex<Option<ExecutionPlan>>,
    results: Mutex<BTreeMap<String, Value>>,
    tool_calls: Mutex<Vec<String>>,
}

impl PipelineEventHandler for Recorder {
    fn on_state(&self, state: PipelineState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_decomposed(&self, decomposition: &TaskDecomposition) {
        *self.decomposition.lock().unwrap() = Some(decomposition.clone());
    }

    fn on_discovered(&self, results: &[DiscoveryResult]) {
        *self.discoveries.lock().unwrap() = results.to_vec();
    }

    fn on_planned(&self, plan: &ExecutionPlan) {
        *self.plan.lock().unwrap() = Some(plan.clone());
    }

    fn on_executed(&self, results: &BTreeMap<String, Value>) {
        *self.results.lock().unwrap() = results.clone();
    }

    fn on_tool_call(&self, task_id: &str, call: &ToolCall) {
        self.tool_calls.lock().unwrap().push(format!("{task_id}:{}", call.name));
    }
}

/// Replies like a model walking the weather scenario.
fn weather_model(request: &CompletionRequest) -> CompletionResponse {
    let system = request.system.as_deref();
    let turns = request.messages.len();

    if system == Some(DISCOVERY_SYSTEM_PROMPT) {
        return match turns {
            1 => CompletionResponse::tool_calls(vec![ToolCall::new("d1", "list_directory", json!({"path": "/"}))]),
            3 => CompletionResponse::tool_calls(vec![ToolCall::new(
                "d2",
                "read_file",
                json!({"path": "/weather/amap-weather/config.json"}),
            )]),
            _ => CompletionResponse::text(
                r#"The weather service fits. {"task_id": "task_001", "mcp_path": "/weather/amap-weather/mcp/amap_weather_mcp.json", "status": "found"}"#,
            ),
        };
    }

    if system == Some(EXECUTION_SYSTEM_PROMPT) {
        return if turns == 1 {
            CompletionResponse::tool_calls(vec![ToolCall::new("e1", WEATHER_TOOL, json!({"city": "北京"}))])
        } else {
            CompletionResponse::text("北京：晴，25°C")
        };
    }

    let prompt = first_text(request);
    if prompt.contains("Start your analysis:") {
        CompletionResponse::text(DECOMPOSITION)
    } else if prompt.contains("Return the plan JSON now:") {
        CompletionResponse::text(PLAN)
    } else {
        CompletionResponse::text(ANSWER)
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    provider: Arc<ScriptedProvider>,
    factory: Arc<LocalFactory>,
    recorder: Arc<Recorder>,
    orchestrator: Orchestrator,
}

fn harness(model: impl Fn(&CompletionRequest) -> CompletionResponse + Send + Sync + 'static) -> Harness {
    let dir = common::registry();
    let store = Arc::new(RegistryStore::new(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::new(model));
    let factory = Arc::new(LocalFactory::default());
    let recorder = Arc::new(Recorder::default());

    let orchestrator = Orchestrator::with_factory(provider.clone(), store, &Config::default(), factory.clone())
        .with_event_handler(recorder.clone());

    Harness {
        _dir: dir,
        provider,
        factory,
        recorder,
        orchestrator,
    }
}

#[tokio::test]
async fn test_weather_request_end_to_end() {
    let h = harness(weather_model);

    let answer = h.orchestrator.process_request(WEATHER_REQUEST).await.unwrap();
    assert_eq!(answer, ANSWER);

    assert_eq!(
        *h.recorder.states.lock().unwrap(),
        vec![
            PipelineState::Decomposed,
            PipelineState::Discovered,
            PipelineState::Planned,
            PipelineState::Executed,
            PipelineState::Synthesized,
        ]
    );

    let decomposition = h.recorder.decomposition.lock().unwrap().clone().unwrap();
    assert_eq!(decomposition.sub_tasks.len(), 1);
    assert!(decomposition.sub_tasks[0].goal.contains("天气"));
    assert_eq!(decomposition.sub_tasks[0].extracted_params["city"], "北京");

    let discoveries = h.recorder.discoveries.lock().unwrap().clone();
    assert_eq!(discoveries[0].status, DiscoveryStatus::Found);
    assert!(discoveries[0].mcp_path.starts_with("/weather/"));

    let plan = h.recorder.plan.lock().unwrap().clone().unwrap();
    assert_eq!(plan.len(), 1);
    assert!(!plan.plan[0].mcp_to_execute.as_ref().unwrap().server_name.is_empty());

    let results = h.recorder.results.lock().unwrap().clone();
    assert_eq!(results.len(), 1);
    assert_eq!(results["task_001"]["config_name"], "高德天气");
    let conversation = results["task_001"]["response"].as_array().unwrap();
    assert!(conversation.iter().any(|m| m["content"] == "北京: 晴, 25°C"));

    let tool_calls = h.recorder.tool_calls.lock().unwrap().clone();
    assert_eq!(
        tool_calls,
        vec![
            "task_001:list_directory".to_string(),
            "task_001:read_file".to_string(),
            format!("task_001:{WEATHER_TOOL}"),
        ]
    );

    let connected = h.factory.connected.lock().unwrap().clone();
    assert_eq!(connected.len(), 1);
    assert_eq!(
        connected[0]["amap-weather"].url.as_deref(),
        Some("https://mcp.amap.com/mcp")
    );

    let synthesis_prompt = h.provider.requests().iter().map(first_text).last().unwrap();
    assert!(synthesis_prompt.contains(WEATHER_REQUEST));
    assert!(synthesis_prompt.contains("高德天气"));
}

#[tokio::test]
async fn test_streamed_answer_matches() {
    let h = harness(weather_model);

    let stream = h.orchestrator.process_request_stream(WEATHER_REQUEST).await.unwrap();
    assert_eq!(h.recorder.states.lock().unwrap().last(), Some(&PipelineState::Executed));

    let pieces: Vec<String> = stream.try_collect().await.unwrap();

    assert_eq!(pieces.concat(), ANSWER);
    assert_eq!(h.recorder.states.lock().unwrap().last(), Some(&PipelineState::Synthesized));
}

#[tokio::test]
async fn test_bad_decomposition_aborts_request() {
    let h = harness(|_| CompletionResponse::text("I am not sure what you mean."));

    let err = h.orchestrator.process_request("???").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::DecompositionParse { .. }));
    assert!(h.recorder.states.lock().unwrap().is_empty());
    assert_eq!(h.provider.requests().len(), 1);
}

#[tokio::test]
async fn test_bad_plan_aborts_before_execution() {
    let h = harness(|request| {
        let reply = weather_model(request);
        if first_text(request).contains("Return the plan JSON now:") {
            CompletionResponse::text("Plan: call the weather server.")
        } else {
            reply
        }
    });

    let err = h.orchestrator.process_request(WEATHER_REQUEST).await.unwrap_err();

    assert_eq!(err.raw_output(), Some("Plan: call the weather server."));
    assert_eq!(
        h.recorder.states.lock().unwrap().last(),
        Some(&PipelineState::Discovered)
    );
    assert!(h.factory.connected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_nothing_discovered_still_synthesizes() {
    let h = harness(|request| {
        if request.system.as_deref() == Some(DISCOVERY_SYSTEM_PROMPT) {
            CompletionResponse::text("Nothing in the registry matches.")
        } else {
            weather_model(request)
        }
    });

    let answer = h.orchestrator.process_request(WEATHER_REQUEST).await.unwrap();

    assert_eq!(answer, ANSWER);
    let results = h.recorder.results.lock().unwrap().clone();
    assert_eq!(results["task_001"], json!({"error": "no configuration found"}));
    assert!(h.factory.connected.lock().unwrap().is_empty());

    let synthesis_prompt = h.provider.requests().iter().map(first_text).last().unwrap();
    assert!(synthesis_prompt.contains("no configuration found"));
}
