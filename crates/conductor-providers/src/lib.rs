//! # conductor-providers
//!
//! Chat-completion providers for Conductor.
//!
//! Every pipeline stage talks to the model through the [`Provider`] trait.
//! The shipped implementation speaks the OpenAI-compatible
//! `/chat/completions` protocol, which covers DashScope, OpenAI and most
//! self-hosted gateways.

pub mod openai;
pub mod traits;

pub use openai::OpenAIProvider;
pub use traits::{
    ChunkStream, CompletionRequest, CompletionResponse, FinishReason, Provider, StreamChunk, Usage,
};
