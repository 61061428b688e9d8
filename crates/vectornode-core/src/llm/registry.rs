//! Holder for the active embedding/chat models
//!
//! The process root constructs one registry and hands clones of the `Arc`
//! to the front-door, the worker pool and the query engine. `POST /api/setup`
//! swaps the active pair; in-flight calls finish on the pair they started with.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::{ChatModel, Embedder, LlmClient};

/// Describes which provider/models are currently serving requests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub provider: String,
    pub chat_model: String,
    pub embed_model: String,
    pub base_url: Option<String>,
}

/// An embedder and a chat model that are installed together
#[derive(Clone)]
pub struct ModelPair {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub descriptor: ModelDescriptor,
}

impl ModelPair {
    /// Build a pair backed by one HTTP client
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Arc::new(LlmClient::new(config.clone())?);
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Arc<LlmClient>) -> Self {
        let descriptor = ModelDescriptor {
            provider: client.provider().to_string(),
            chat_model: client.chat_model().to_string(),
            embed_model: client.embed_model().to_string(),
            base_url: Some(client.base_url().to_string()),
        };
        Self {
            embedder: client.clone(),
            chat: client,
            descriptor,
        }
    }

    /// Placeholder installed until `POST /api/setup` succeeds; every call fails
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        let model = Arc::new(Unconfigured {
            reason: reason.into(),
        });
        Self {
            embedder: model.clone(),
            chat: model,
            descriptor: ModelDescriptor {
                provider: "UNCONFIGURED".to_string(),
                chat_model: String::new(),
                embed_model: String::new(),
                base_url: None,
            },
        }
    }
}

struct Unconfigured {
    reason: String,
}

#[async_trait]
impl Embedder for Unconfigured {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::ProviderUnavailable(self.reason.clone()))
    }
}

#[async_trait]
impl ChatModel for Unconfigured {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::ProviderUnavailable(self.reason.clone()))
    }
}

/// Hot-swappable model holder
pub struct ModelRegistry {
    active: RwLock<Arc<ModelPair>>,
}

impl ModelRegistry {
    pub fn new(pair: ModelPair) -> Self {
        Self {
            active: RwLock::new(Arc::new(pair)),
        }
    }

    /// Snapshot of the active pair
    pub fn current(&self) -> Arc<ModelPair> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn descriptor(&self) -> ModelDescriptor {
        self.current().descriptor.clone()
    }

    /// Replace the active pair
    pub fn install(&self, pair: ModelPair) {
        info!(
            provider = %pair.descriptor.provider,
            chat_model = %pair.descriptor.chat_model,
            embed_model = %pair.descriptor.embed_model,
            "Installing model pair"
        );
        let mut guard = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(pair);
    }
}

#[async_trait]
impl Embedder for ModelRegistry {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let pair = self.current();
        pair.embedder.embed(text).await
    }
}

#[async_trait]
impl ChatModel for ModelRegistry {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let pair = self.current();
        pair.chat.complete(prompt).await
    }
}
