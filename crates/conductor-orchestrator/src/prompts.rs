//! Prompt templates for each model-driven stage.

use serde_json::{Map, Value};

use crate::types::SubTask;

/// System prompt for the registry exploration agent.
pub const DISCOVERY_SYSTEM_PROMPT: &str = r#"You are a tool discovery assistant. Your job is to find the MCP tool that can complete the user's task.

You can explore the MCP file system with two tools:
- list_directory: list the subdirectories and files under a path
- read_file: read the full content of an MCP file

The root is `/`. Every service lives in `/<category>/<service>/`, which usually contains:
- `config.json`: a short description of the service (JSON)
- `mcp/*.json`: MCP server configuration with an `mcpServers` field

MCP servers are loaded in one of two ways:
1. HTTP: {"type": "streamable_http", "url": "remote address"}
2. Local process: {"command": "command", "args": ["arg1", "arg2"]}

Search greedily:
1. List the root directory '/' to see the categories.
2. Decide which category is most likely to hold a suitable tool for the task.
3. If no category matches the task, report not found right away. Do not keep digging.
4. If a category matches, list it to see its services.
5. In the matching service directory, look for config.json.
6. Read config.json to confirm the service fits the task.
7. If it fits, find the concrete configuration file under its mcp directory (for example mcp/howtocook_mcp.json).

Important:
- Never return a path containing a wildcard (*).
- Always return a concrete file path, for example "/food/howtocook/mcp/howtocook_mcp.json".
- Make sure the path points to a file that exists.

When you have found the file, answer with JSON:
{"task_id": "...", "mcp_path": "...", "status": "found"}
If nothing fits, answer with:
{"task_id": "...", "mcp_path": "", "status": "not_found"}"#;

/// System prompt for the agent that runs one planned MCP call.
pub const EXECUTION_SYSTEM_PROMPT: &str = "You carry out one task by calling the MCP tools you are given. \
Call the requested tool with the given parameters, adapting them only when the tool's schema requires it. \
When you have the tool's answer, reply with a short summary of the result.";

/// Extracted parameters as JSON, keeping non-ASCII text readable.
fn params_json(params: &Map<String, Value>) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string())
}

/// Ask the model to split a request into sub-tasks.
pub fn decomposition_prompt(user_input: &str) -> String {
    format!(
        r#"You are my assistant. Analyze the user's question and break it into sub-tasks, each of which needs a different kind of tool.

Identify every independent sub-task and extract the parameters it needs.

Answer in JSON with this format:
{{
    "analysis": "your analysis of the request",
    "sub_tasks": [
        {{
            "id": "task_001",
            "goal": "what the sub-task should achieve",
            "required_tool_type": "the kind of tool needed, e.g. 'weather forecast, location-based service'",
            "extracted_params": {{
                "parameter name": "parameter value"
            }}
        }}
    ]
}}

User question: {user_input}

Start your analysis:"#
    )
}

/// The user turn that starts discovery for one sub-task.
pub fn discovery_prompt(task: &SubTask) -> String {
    format!(
        r#"Find a suitable tool for a task. Explore the MCP file system with two tools:

1. list_directory(path: str): list the subdirectories and file names under a directory
2. read_file(path: str): read the full description of an MCP file

The root of the file system is /. Every service lives in `/<category>/<service>/` and usually contains `config.json` (service metadata) and JSON configuration under `mcp/` (an `mcpServers` field describing the available MCP servers).

Task:
- Task ID: {id}
- Goal: {goal}
- Required tool type: {capability}
- Extracted parameters: {params}

Plan your exploration and use the tools to find a suitable MCP service. When you have found it, report the tool path and confirm it."#,
        id = task.id,
        goal = task.goal,
        capability = task.required_capability,
        params = params_json(&task.extracted_params),
    )
}

/// One task's block in the planning prompt.
pub struct PlanningContext<'a> {
    pub task_id: &'a str,
    pub goal: &'a str,
    pub mcp_path: &'a str,
    /// Serialized registry content of `mcp_path`.
    pub description: String,
    pub extracted_params: &'a Map<String, Value>,
}

/// Ask the model for a concrete execution plan.
pub fn execution_plan_prompt(user_input: &str, contexts: &[PlanningContext<'_>]) -> String {
    let discovery_results = contexts
        .iter()
        .map(|ctx| {
            format!(
                "Task ID: {}\nGoal: {}\nMCP path: {}\nMCP description: {}\nExtracted parameters: {}",
                ctx.task_id,
                ctx.goal,
                ctx.mcp_path,
                ctx.description,
                params_json(ctx.extracted_params),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Tool discovery is complete. Using the information below, write the final executable MCP call plan for the user's request.

User request: {user_input}

Discovery results:
{discovery_results}

**Return only the plan as pure JSON. Do not use Markdown code fences (such as ```json or ```), explanations, comments or anything else. Return the JSON object directly.**

Plan format (follow it exactly and add nothing):
{{
    "plan": [
        {{
            "task_id": "task_001",
            "mcp_to_execute": {{
                "server_name": "MCP server name (a key of mcpServers)",
                "tool_name": "tool to call, if known (one of the tools the server exposes)",
                "arguments": {{
                    "parameter name": "parameter value"
                }}
            }}
        }}
    ]
}}

Make sure that:
1. server_name matches a key of the MCP server configuration in the discovery results
2. tool_name matches a tool of that server when you can tell which one; otherwise leave it empty
3. argument values are mapped correctly from extracted_params and are valid
4. **you return only the JSON object, without ```json fences, explanations or comments**

Return the plan JSON now:"#
    )
}

/// Ask the model to fold the execution results into one answer.
pub fn synthesis_prompt(user_input: &str, execution_results: &str) -> String {
    format!(
        r#"All tasks have been executed. Using the information below, write a natural, fluent final answer for the user.

Original question: {user_input}

Execution results:
{execution_results}

Write a friendly, clear and complete answer that brings all the results together, in the language of the question.
If a result has a `config_name` field, name that MCP configuration explicitly in the answer (for example by citing `@{{config_name}}`)."#
    )
}
