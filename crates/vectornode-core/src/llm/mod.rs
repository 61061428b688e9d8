//! LLM integration - embedding and chat providers
//!
//! This module provides:
//! - `Embedder` and `ChatModel`, the two seams the pipeline depends on
//! - An OpenAI-compatible HTTP client covering OpenAI, Gemini, Azure, Ollama and Mistral
//! - A hot-swappable `ModelRegistry` owned by the process root

mod client;
mod provider;
mod registry;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{LlmClient, LlmClientBuilder};
pub use provider::{AZURE_API_VERSION, Provider};
pub use registry::{ModelDescriptor, ModelPair, ModelRegistry};
pub use types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Message, MessageRole};

/// Text to fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Single-turn prompt completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
