//! Run one request through the pipeline and print the answer.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use conductor_core::{Config, ToolCall, ToolResult};
use conductor_orchestrator::{
    DiscoveryResult, ExecutionPlan, Orchestrator, PipelineEventHandler, PipelineState, TaskDecomposition,
};

use super::report;

/// Shows pipeline progress on a spinner and prints the decomposition.
struct ProgressPrinter {
    spinner: ProgressBar,
}

impl ProgressPrinter {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message("Decomposing request...");
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl PipelineEventHandler for ProgressPrinter {
    fn on_state(&self, state: PipelineState) {
        let next = match state {
            PipelineState::Received => "Decomposing request...",
            PipelineState::Decomposed => "Searching the registry...",
            PipelineState::Discovered => "Planning tool calls...",
            PipelineState::Planned => "Calling MCP servers...",
            PipelineState::Executed => "Writing the answer...",
            PipelineState::Synthesized => "Done",
        };
        // A streamed answer finishes the spinner before the last state arrives.
        if !self.spinner.is_finished() {
            self.spinner.set_message(next);
        }
    }

    fn on_tool_call(&self, task_id: &str, call: &ToolCall) {
        self.spinner.set_message(format!("{task_id}: {}", call.name));
    }

    fn on_tool_result(&self, task_id: &str, call: &ToolCall, result: &ToolResult) {
        if !result.success {
            tracing::debug!(task_id, tool = %call.name, output = %result.output, "Tool call failed");
        }
    }

    fn on_decomposed(&self, decomposition: &TaskDecomposition) {
        self.spinner.suspend(|| {
            println!("Analysis: {}", decomposition.analysis);
            println!("Sub-tasks ({}):", decomposition.sub_tasks.len());
            for task in &decomposition.sub_tasks {
                println!("  [{}] {}", task.id, task.goal);
                if !task.required_capability.is_empty() {
                    println!("      needs: {}", task.required_capability);
                }
                if !task.extracted_params.is_empty() {
                    println!("      params: {}", Value::Object(task.extracted_params.clone()));
                }
            }
            println!();
        });
    }

    fn on_discovered(&self, results: &[DiscoveryResult]) {
        for result in results {
            tracing::debug!(task_id = %result.task_id, status = %result.status, path = %result.mcp_path, "Discovery");
        }
    }

    fn on_planned(&self, plan: &ExecutionPlan) {
        tracing::debug!(items = plan.len(), "Execution plan ready");
    }

    fn on_executed(&self, results: &BTreeMap<String, Value>) {
        let failed = results.values().filter(|r| r.get("error").is_some()).count();
        if failed > 0 {
            tracing::warn!(failed, total = results.len(), "Some tasks failed");
        }
    }
}

pub async fn run(request: &str, stream: bool, config: Config) -> anyhow::Result<()> {
    let validation = config.validate();
    if !validation.is_ok() {
        for issue in validation.errors() {
            eprintln!("{}: {}", issue.field, issue.message);
        }
        anyhow::bail!("Invalid configuration");
    }

    let progress = Arc::new(ProgressPrinter::new());
    let orchestrator = Orchestrator::from_config(&config)
        .map_err(report)?
        .with_event_handler(progress.clone());

    println!("Request: {}\n", request);

    let outcome = if stream {
        stream_answer(&orchestrator, request, &progress).await
    } else {
        orchestrator.process_request(request).await.map(|answer| {
            progress.finish();
            println!("{}", answer);
        })
    };

    progress.finish();
    orchestrator.close().await;

    if let Err(e) = outcome {
        if let Some(raw) = e.raw_output() {
            tracing::debug!(raw, "Model output that failed to parse");
        }
        return Err(report(e));
    }
    Ok(())
}

async fn stream_answer(
    orchestrator: &Orchestrator,
    request: &str,
    progress: &ProgressPrinter,
) -> conductor_orchestrator::Result<()> {
    let mut stream = orchestrator.process_request_stream(request).await?;
    progress.finish();

    while let Some(delta) = stream.next().await {
        print!("{}", delta?);
        // Flush failures only affect display.
        let _ = io::stdout().flush();
    }

    println!();
    Ok(())
}
