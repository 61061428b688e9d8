//! Runtime provider setup
//!
//! A candidate provider configuration is checked before it replaces the
//! active model pair; accepted configurations are recorded with the API key
//! redacted.

mod service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use service::{ClientFactory, SetupService};

/// Body of `POST /api/setup`
#[derive(Debug, Clone, Deserialize)]
pub struct SetupRequest {
    pub provider: String,
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
    #[serde(alias = "chatModel", alias = "modelName")]
    pub chat_model: String,
    #[serde(default, alias = "embedModel")]
    pub embed_model: Option<String>,
    #[serde(default, alias = "baseUrl")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupResponse {
    pub success: bool,
    pub message: String,
    pub configured_provider: String,
    pub configured_chat_model: String,
    pub configured_embed_model: String,
    pub base_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An accepted provider configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupRecord {
    pub id: String,
    pub provider: String,
    pub chat_model: String,
    pub embed_model: String,
    pub base_url: Option<String>,
    /// Last characters of the key, e.g. `***abcd`
    pub api_key_hint: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Storage for accepted configurations
#[async_trait]
pub trait SetupRepository: Send + Sync {
    /// Store `record` as the only active configuration
    async fn save_active(&self, record: &SetupRecord) -> Result<()>;

    async fn active(&self) -> Result<Option<SetupRecord>>;

    /// Most recent first
    async fn history(&self, limit: usize) -> Result<Vec<SetupRecord>>;
}
