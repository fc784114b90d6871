//! Tool execution for the agent loop.
//!
//! [`ToolExecutor`] wraps a [`ToolRegistry`] and turns every outcome into a
//! [`ToolResult`]: lookup failures and tool errors become error results the
//! model can read, so one bad call never aborts a turn.

use conductor_core::{ToolCall, ToolResult};
use conductor_tools::ToolRegistry;
use futures::future::join_all;
use tracing::{debug, info, warn};

/// Runs tool calls against a registry.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Execute one call. Never fails; errors are reported in the result.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool call");

        let result = match self.registry.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
        };

        debug!(
            tool = %call.name,
            success = result.success,
            duration_ms = result.duration_ms,
            "Tool execution completed"
        );

        result
    }

    /// Execute calls concurrently; results keep the order of `calls`.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        match calls {
            [] => Vec::new(),
            [call] => vec![self.execute(call).await],
            _ => {
                info!(count = calls.len(), "Executing tool calls in batch");
                join_all(calls.iter().map(|call| self.execute(call))).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::ToolDefinition;
    use conductor_tools::{Tool, ToolError};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("sleepy", "Sleeps, then echoes 'ms'")
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
            let ms = call.arguments["ms"].as_u64().ok_or_else(|| ToolError::missing_param("ms"))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ToolResult::success(&call.id, ms.to_string()))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepyTool));
        ToolExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_execute_batch_empty() {
        assert!(executor().execute_batch(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_batch_keeps_order() {
        let calls = vec![
            ToolCall::new("1", "sleepy", json!({"ms": 40})),
            ToolCall::new("2", "nonexistent", json!({})),
            ToolCall::new("3", "sleepy", json!({"ms": 1})),
            ToolCall::new("4", "sleepy", json!({})),
        ];

        let results = executor().execute_batch(&calls).await;

        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(results[0].output, "40");
        assert!(!results[1].success);
        assert!(results[1].content().contains("tool not found"));
        assert_eq!(results[2].output, "1");
        assert!(results[3].content().contains("missing required parameter"));
    }
}
