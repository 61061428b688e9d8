//! HTTP client for OpenAI-compatible embedding and chat providers
//!
//! One client serves both seams of the pipeline:
//! - `embed(text)` for contexts, entities, knowledge base entries and queries
//! - `complete(prompt)` for entity/relation extraction
//!
//! Transient failures (429, 5xx, transport errors) are retried with
//! exponential backoff and jitter.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::provider::Provider;
use super::types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, Message};
use super::{ChatModel, Embedder};

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 500;

/// Upper bound on a single backoff sleep (in milliseconds)
const BACKOFF_MAX_MS: u64 = 30_000;

/// Provider client for embeddings and chat completions
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.config.provider)
            .field("base_url", &self.base_url)
            .field("chat_model", &self.config.chat_model)
            .field("embed_model", &self.config.embed_model)
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl LlmClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the LLM configuration
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the API key, overriding the one in the configuration
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL, overriding the provider default
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the LlmClient
    pub fn build(self) -> Result<LlmClient> {
        let config = self.config.unwrap_or_default();
        let api_key = self
            .api_key
            .or_else(|| config.api_key.clone())
            .filter(|k| !k.trim().is_empty());

        if api_key.is_none() && config.provider.requires_api_key() {
            return Err(Error::InvalidInput(format!(
                "API key is required for provider {}",
                config.provider
            )));
        }

        let base_url = self
            .base_url
            .unwrap_or_else(|| config.resolved_base_url())
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            config,
            api_key,
            base_url,
        })
    }
}

impl LlmClient {
    /// Create a client from configuration (API key taken from the config)
    pub fn new(config: LlmConfig) -> Result<Self> {
        LlmClientBuilder::new().config(config).build()
    }

    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    pub fn embed_model(&self) -> &str {
        &self.config.embed_model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate an embedding vector for a single text
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: self.model_field(&self.config.embed_model),
            input: text.to_string(),
            dimensions: self.config.embedding_dimensions,
        };
        let url = self
            .config
            .provider
            .embeddings_url(&self.base_url, &self.config.embed_model);

        let vector = self
            .with_retry("embedding", || self.send_embedding(&url, &request))
            .await
            .map_err(|e| match e {
                Error::AuthFailed(_) | Error::EmbeddingFailed(_) => e,
                other => Error::EmbeddingFailed(other.to_string()),
            })?;

        if let Some(expected) = self.config.embedding_dimensions
            && vector.len() != expected
        {
            return Err(Error::EmbeddingFailed(format!(
                "Provider returned {} dimensions, expected {}",
                vector.len(),
                expected
            )));
        }

        Ok(vector)
    }

    /// Run a single-turn chat completion and return the assistant text
    pub async fn complete_prompt(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(
            self.model_field(&self.config.chat_model),
            vec![Message::user(prompt)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let url = self
            .config
            .provider
            .chat_url(&self.base_url, &self.config.chat_model);

        self.with_retry("chat", || self.send_chat(&url, &request)).await
    }

    /// Azure selects the model by deployment name in the URL
    fn model_field(&self, model: &str) -> Option<String> {
        match self.config.provider {
            Provider::Azure => None,
            _ => Some(model.to_string()),
        }
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempts < max_attempts => {
                    let suggested = match &e {
                        Error::RateLimited(secs) => *secs,
                        _ => 0,
                    };
                    let backoff = calculate_backoff(attempts, suggested);
                    warn!(
                        operation,
                        attempt = attempts,
                        wait_ms = backoff,
                        error = %e,
                        "Transient provider error, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.api_key, self.config.provider) {
            (Some(key), Provider::Azure) => request.header("api-key", key),
            (Some(key), _) => request.bearer_auth(key),
            (None, _) => request,
        }
    }

    async fn send_embedding(&self, url: &str, request: &EmbeddingRequest) -> Result<Vec<f32>> {
        debug!(provider = %self.config.provider, model = %self.config.embed_model, "Sending embedding request");

        let response = self
            .authorized(self.http_client.post(url))
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;

        body.data.sort_by_key(|d| d.index);
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))?;

        if vector.is_empty() {
            return Err(Error::EmbeddingFailed("Provider returned an empty vector".to_string()));
        }
        Ok(vector)
    }

    async fn send_chat(&self, url: &str, request: &ChatRequest) -> Result<String> {
        debug!(provider = %self.config.provider, model = %self.config.chat_model, "Sending chat completion request");

        let response = self
            .authorized(self.http_client.post(url))
            .json(request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        body.into_content()
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text).await
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_prompt(prompt).await
    }
}

/// Map a non-success provider response onto the error taxonomy
async fn handle_error_response<T>(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> Result<T> {
    let retry_after_header = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => Err(Error::AuthFailed(format!("HTTP {}: {}", status.as_u16(), truncate(&body)))),
        429 => {
            let wait_secs = retry_after_header
                .or_else(|| extract_retry_after(&body))
                .unwrap_or(1);
            Err(Error::RateLimited(wait_secs))
        }
        500..=599 => Err(Error::ProviderUnavailable(format!("Server error ({}): {}", status, truncate(&body)))),
        _ => Err(Error::LLMError(format!("HTTP error {}: {}", status, truncate(&body)))),
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

/// Calculate backoff delay with jitter
fn calculate_backoff(attempt: u32, suggested_wait_secs: u64) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    let base = BACKOFF_BASE_MS.saturating_mul(1u64 << exp);
    let delay = base.max(suggested_wait_secs.saturating_mul(1000)).min(BACKOFF_MAX_MS);

    // Up to 10% jitter
    let jitter = (delay / 10).max(1);
    delay + rand::thread_rng().gen_range(0..jitter)
}

/// Extract retry-after value from an error response body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}
