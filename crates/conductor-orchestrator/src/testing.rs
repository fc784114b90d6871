//! Test doubles shared by the unit tests of this crate.

use std::sync::Mutex;

use async_trait::async_trait;
use conductor_providers::{ChunkStream, CompletionRequest, CompletionResponse, Provider, StreamChunk};
use futures::stream;

type Handler = Box<dyn Fn(&CompletionRequest) -> CompletionResponse + Send + Sync>;

/// A provider whose replies are computed from each request.
///
/// Stages run concurrently, so replies are routed by request content rather
/// than by call order.
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

    /// Always reply with `text`.
    pub fn text(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| CompletionResponse::text(text.clone()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Text of the first user message of a request.
pub fn first_user_text(request: &CompletionRequest) -> String {
    request.messages.first().map(|m| m.text()).unwrap_or_default()
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
            .split_inclusive(' ')
            .map(|piece| {
                Ok(StreamChunk {
                    delta: Some(piece.to_string()),
                    is_final: false,
                })
            })
            .chain(std::iter::once(Ok(StreamChunk {
                delta: None,
                is_final: true,
            })))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
