use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::llm::{ModelPair, ModelRegistry, Provider};

use super::{SetupRecord, SetupRepository, SetupRequest, SetupResponse};

const CHECK_EMBED_TEXT: &str = "test";
const CHECK_PROMPT: &str = "Hello";

/// Builds a model pair for a candidate configuration
pub type ClientFactory = Arc<dyn Fn(&LlmConfig) -> Result<ModelPair> + Send + Sync>;

pub struct SetupService {
    registry: Arc<ModelRegistry>,
    repository: Arc<dyn SetupRepository>,
    base: LlmConfig,
    factory: ClientFactory,
}

impl SetupService {
    /// `base` supplies timeouts, retries and dimension pinning for every candidate
    pub fn new(
        registry: Arc<ModelRegistry>,
        repository: Arc<dyn SetupRepository>,
        base: LlmConfig,
    ) -> Self {
        Self::with_factory(registry, repository, base, Arc::new(ModelPair::from_config))
    }

    pub fn with_factory(
        registry: Arc<ModelRegistry>,
        repository: Arc<dyn SetupRepository>,
        base: LlmConfig,
        factory: ClientFactory,
    ) -> Self {
        Self {
            registry,
            repository,
            base,
            factory,
        }
    }

    /// Check the candidate provider and, if it answers, make it the active pair
    pub async fn configure(&self, request: SetupRequest) -> Result<SetupResponse> {
        let config = self.candidate(request)?;
        info!(
            provider = %config.provider,
            chat_model = %config.chat_model,
            embed_model = %config.embed_model,
            "Checking provider configuration"
        );

        let pair = (self.factory)(&config)?;
        check_provider(&pair).await?;

        let base_url = config.resolved_base_url();
        let record = SetupRecord {
            id: Uuid::new_v4().to_string(),
            provider: config.provider.to_string(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            base_url: Some(base_url.clone()),
            api_key_hint: config.redacted_api_key(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.repository.save_active(&record).await?;
        self.registry.install(pair);

        Ok(SetupResponse {
            success: true,
            message: "Setup params validated and verified successfully. Backend is ready.".to_string(),
            configured_provider: record.provider,
            configured_chat_model: record.chat_model,
            configured_embed_model: record.embed_model,
            base_url: Some(base_url),
            timestamp: record.created_at,
        })
    }

    pub async fn active(&self) -> Result<Option<SetupRecord>> {
        self.repository.active().await
    }

    fn candidate(&self, request: SetupRequest) -> Result<LlmConfig> {
        let provider: Provider = request.provider.parse()?;

        let chat_model = request.chat_model.trim().to_string();
        if chat_model.is_empty() {
            return Err(Error::InvalidInput("chat_model must not be empty".to_string()));
        }
        let embed_model = match request.embed_model.map(|m| m.trim().to_string()) {
            Some(model) if !model.is_empty() => model,
            _ => provider.default_embed_model().to_string(),
        };

        Ok(LlmConfig {
            provider,
            api_key: request.api_key.filter(|k| !k.trim().is_empty()),
            base_url: request.base_url.filter(|u| !u.trim().is_empty()),
            chat_model,
            embed_model,
            ..self.base.clone()
        })
    }
}

async fn check_provider(pair: &ModelPair) -> Result<()> {
    pair.embedder
        .embed(CHECK_EMBED_TEXT)
        .await
        .map_err(|e| check_failure("embedding", e))?;
    pair.chat
        .complete(CHECK_PROMPT)
        .await
        .map_err(|e| check_failure("chat", e))?;
    Ok(())
}

fn check_failure(stage: &str, e: Error) -> Error {
    warn!(stage = stage, error = %e, "Provider check failed");
    match e {
        Error::AuthFailed(_) => e,
        other => Error::LLMError(format!("{} check failed: {}", stage, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::setup::SqliteSetupRepository;
    use crate::llm::{ChatModel, Embedder};
    use crate::storage::Database;
    use crate::testing::{FailingEmbedder, FixedEmbedder, ScriptedChat, fake_pair};

    async fn repository() -> Arc<SqliteSetupRepository> {
        let db = Database::in_memory().await.unwrap();
        Arc::new(SqliteSetupRepository::new(db.pool().clone()))
    }

    fn registry() -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::new(fake_pair(
            Arc::new(FixedEmbedder::new(vec![1.0])),
            Arc::new(ScriptedChat::always("old")),
        )))
    }

    fn factory(embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> ClientFactory {
        Arc::new(move |config: &LlmConfig| {
            let mut pair = fake_pair(embedder.clone(), chat.clone());
            pair.descriptor.provider = config.provider.to_string();
            pair.descriptor.chat_model = config.chat_model.clone();
            Ok(pair)
        })
    }

    fn request(provider: &str, chat_model: &str) -> SetupRequest {
        SetupRequest {
            provider: provider.to_string(),
            api_key: Some("sk-test-abcd".to_string()),
            chat_model: chat_model.to_string(),
            embed_model: None,
            base_url: None,
        }
    }

    #[tokio::test]
    async fn test_successful_check_installs_and_persists() {
        let registry = registry();
        let repository = repository().await;
        let service = SetupService::with_factory(
            registry.clone(),
            repository.clone(),
            LlmConfig::default(),
            factory(
                Arc::new(FixedEmbedder::new(vec![0.5, 0.5])),
                Arc::new(ScriptedChat::always("hi")),
            ),
        );

        let response = service.configure(request("mistral", "mistral-small")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.configured_provider, "MISTRAL");
        assert_eq!(response.configured_embed_model, Provider::Mistral.default_embed_model());
        assert_eq!(registry.descriptor().chat_model, "mistral-small");
        assert_eq!(registry.embed("x").await.unwrap().len(), 2);

        let active = service.active().await.unwrap().unwrap();
        assert_eq!(active.api_key_hint.as_deref(), Some("***abcd"));
    }

    #[tokio::test]
    async fn test_failed_check_keeps_current_pair() {
        let registry = registry();
        let service = SetupService::with_factory(
            registry.clone(),
            repository().await,
            LlmConfig::default(),
            factory(Arc::new(FailingEmbedder), Arc::new(ScriptedChat::always("hi"))),
        );

        let err = service.configure(request("openai", "gpt-4o")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(registry.descriptor().chat_model, "fake-chat");
        assert!(service.active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_is_surfaced() {
        let service = SetupService::with_factory(
            registry(),
            repository().await,
            LlmConfig::default(),
            factory(
                Arc::new(FixedEmbedder::new(vec![1.0])),
                Arc::new(ScriptedChat::failing(|| Error::AuthFailed("bad key".to_string()))),
            ),
        );

        let err = service.configure(request("gemini", "gemini-1.5-flash")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailed);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let service = SetupService::with_factory(
            registry(),
            repository().await,
            LlmConfig::default(),
            factory(Arc::new(FixedEmbedder::new(vec![1.0])), Arc::new(ScriptedChat::always(""))),
        );

        let err = service.configure(request("cohere", "m")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = service.configure(request("openai", "  ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_request_accepts_camel_case() {
        let request: SetupRequest = serde_json::from_value(serde_json::json!({
            "provider": "OLLAMA",
            "modelName": "llama3",
            "baseUrl": "http://gpu:11434/v1"
        }))
        .unwrap();
        assert_eq!(request.chat_model, "llama3");
        assert_eq!(request.base_url.as_deref(), Some("http://gpu:11434/v1"));
        assert!(request.api_key.is_none());
    }
}
