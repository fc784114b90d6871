//! The five-stage request pipeline.
//!
//! ```text
//! request ─▶ decompose ─▶ discover (per task) ─▶ plan ─▶ execute (per task) ─▶ synthesize ─▶ answer
//! ```
//!
//! Every request gets a fresh [`RequestContext`], so one [`Orchestrator`]
//! can serve concurrent requests. A failure before execution aborts the
//! request; failures inside discovery and execution stay with their task.

use std::collections::BTreeMap;
use std::sync::Arc;

use conductor_core::Config;
use conductor_providers::{OpenAIProvider, Provider};
use conductor_registry::RegistryStore;
use futures::{future, stream, StreamExt};
use serde_json::Value;
use tracing::{info, instrument};

use crate::context::{PipelineState, RequestContext};
use crate::decomposer::TaskDecomposer;
use crate::discovery::ToolDiscoveryAgent;
use crate::error::Result;
use crate::events::{NoOpPipelineHandler, PipelineEventHandler};
use crate::execution::{ExecutionEngine, McpClientFactory, ToolClientFactory};
use crate::planner::ExecutionPlanner;
use crate::prompts::PlanningContext;
use crate::synthesizer::{ResponseSynthesizer, TextStream};

pub struct Orchestrator {
    store: Arc<RegistryStore>,
    decomposer: TaskDecomposer,
    discovery: ToolDiscoveryAgent,
    planner: ExecutionPlanner,
    engine: ExecutionEngine,
    synthesizer: ResponseSynthesizer,
    events: Arc<dyn PipelineEventHandler>,
}

impl Orchestrator {
    /// An orchestrator that reaches tool servers through MCP.
    pub fn new(provider: Arc<dyn Provider>, store: Arc<RegistryStore>, config: &Config) -> Self {
        Self::with_factory(provider, store, config, Arc::new(McpClientFactory))
    }

    pub fn with_factory(
        provider: Arc<dyn Provider>,
        store: Arc<RegistryStore>,
        config: &Config,
        factory: Arc<dyn ToolClientFactory>,
    ) -> Self {
        Self {
            decomposer: TaskDecomposer::new(Arc::clone(&provider)),
            discovery: ToolDiscoveryAgent::new(
                Arc::clone(&provider),
                Arc::clone(&store),
                config.limits.discovery_max_turns,
            ),
            planner: ExecutionPlanner::new(Arc::clone(&provider)),
            engine: ExecutionEngine::new(
                Arc::clone(&provider),
                Arc::clone(&store),
                factory,
                config.mcp.default_server_url.clone(),
                config.limits.execution_max_turns,
            ),
            synthesizer: ResponseSynthesizer::new(provider),
            store,
            events: Arc::new(NoOpPipelineHandler),
        }
    }

    /// Build the OpenAI-compatible provider and open the registry from
    /// `config`.
    pub fn from_config(config: &Config) -> conductor_core::Result<Self> {
        let provider = Arc::new(OpenAIProvider::from_config(&config.llm)?);
        let store = Arc::new(RegistryStore::new(&config.registry.root)?);
        Ok(Self::new(provider, store, config))
    }

    /// Report stage transitions and every agent tool call to `handler`.
    pub fn with_event_handler(mut self, handler: Arc<dyn PipelineEventHandler>) -> Self {
        self.discovery = self.discovery.with_event_handler(Arc::clone(&handler));
        self.engine = self.engine.with_event_handler(Arc::clone(&handler));
        self.events = handler;
        self
    }

    pub fn store(&self) -> &Arc<RegistryStore> {
        &self.store
    }

    /// Run the whole pipeline and return the final answer.
    #[instrument(skip(self))]
    pub async fn process_request(&self, user_input: &str) -> Result<String> {
        let mut ctx = RequestContext::new();
        let results = self.run_to_execution(user_input, &mut ctx).await?;

        let answer = self.synthesizer.synthesize(user_input, &results).await?;
        self.advance(&mut ctx, PipelineState::Synthesized)?;
        info!("Request complete");
        Ok(answer)
    }

    /// Run stages one to four, then stream the synthesized answer.
    ///
    /// The request reaches [`PipelineState::Synthesized`] once the returned
    /// stream has been read to the end.
    #[instrument(skip(self))]
    pub async fn process_request_stream(&self, user_input: &str) -> Result<TextStream> {
        let mut ctx = RequestContext::new();
        let results = self.run_to_execution(user_input, &mut ctx).await?;

        let answer = self.synthesizer.synthesize_stream(user_input, &results).await?;
        let events = Arc::clone(&self.events);
        let finish = stream::once(async move {
            match ctx.advance(PipelineState::Synthesized) {
                Ok(()) => {
                    events.on_state(PipelineState::Synthesized);
                    None
                }
                Err(e) => Some(Err(e)),
            }
        })
        .filter_map(future::ready);

        Ok(answer.chain(finish).boxed())
    }

    /// Disconnect any tool servers still held by an interrupted request.
    pub async fn close(&self) {
        self.engine.close().await;
    }

    async fn run_to_execution(&self, user_input: &str, ctx: &mut RequestContext) -> Result<BTreeMap<String, Value>> {
        info!("Processing request");

        let decomposition = self.decomposer.decompose(user_input).await?;
        ctx.task_map = decomposition
            .sub_tasks
            .iter()
            .map(|task| (task.id.clone(), task.clone()))
            .collect();
        self.advance(ctx, PipelineState::Decomposed)?;
        self.events.on_decomposed(&decomposition);

        let discoveries = self.discovery.discover_all(&decomposition.sub_tasks).await;
        ctx.discovery_map = discoveries
            .iter()
            .map(|result| (result.task_id.clone(), result.clone()))
            .collect();
        self.advance(ctx, PipelineState::Discovered)?;
        self.events.on_discovered(&discoveries);

        let mut contexts = Vec::with_capacity(decomposition.sub_tasks.len());
        for task in &decomposition.sub_tasks {
            let discovery = ctx.discovery_map.get(&task.id);
            let description = match discovery {
                Some(discovery) => ctx
                    .content_cache
                    .load(&self.store, discovery)
                    .await
                    .map(|content| content.render())
                    .unwrap_or_default(),
                None => String::new(),
            };
            contexts.push(PlanningContext {
                task_id: &task.id,
                goal: &task.goal,
                mcp_path: discovery.map(|d| d.mcp_path.as_str()).unwrap_or_default(),
                description,
                extracted_params: &task.extracted_params,
            });
        }

        let plan = self.planner.plan(user_input, &contexts).await?;
        drop(contexts);
        self.advance(ctx, PipelineState::Planned)?;
        self.events.on_planned(&plan);

        let servers = self.engine.merge_config(&discoveries, &mut ctx.content_cache).await;
        let results = self
            .engine
            .execute(&plan, &servers, &ctx.task_map, &ctx.discovery_map)
            .await;
        self.advance(ctx, PipelineState::Executed)?;
        self.events.on_executed(&results);

        Ok(results)
    }

    fn advance(&self, ctx: &mut RequestContext, to: PipelineState) -> Result<()> {
        ctx.advance(to)?;
        self.events.on_state(to);
        Ok(())
    }
}
