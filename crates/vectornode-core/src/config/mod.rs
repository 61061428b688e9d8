//! Configuration loading: defaults, optional TOML file, then environment

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::Provider;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "VECTORNODE_CONFIG";

/// Vectornode configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub chat_model: String,
    pub embed_model: String,
    /// Pinned embedding dimension; vectors of another length are rejected
    pub embedding_dimensions: Option<usize>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite DSN (`sqlite://path/to.db`, a bare path, or `sqlite::memory:`)
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub worker_pool_size: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub visibility_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            api_key: None,
            base_url: None,
            chat_model: "gpt-4o-mini".to_string(),
            embed_model: Provider::OpenAi.default_embed_model().to_string(),
            embedding_dimensions: None,
            temperature: 0.0,
            max_tokens: 2048,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.redacted_api_key())
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embed_model", &self.embed_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            worker_pool_size: 4,
            batch_size: 16,
            max_attempts: 5,
            retry_backoff_ms: 1000,
            poll_interval_ms: 500,
            visibility_timeout_secs: 300,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl LlmConfig {
    /// Base URL to use, falling back to the provider default
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    pub fn redacted_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(redact_key)
    }
}

/// Keep only the last four characters of a credential
pub fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", suffix)
    }
}

/// Default on-disk database location
pub fn default_database_url() -> String {
    let path = dirs::data_dir()
        .map(|dir| dir.join("vectornode").join("vectornode.db"))
        .unwrap_or_else(|| PathBuf::from("vectornode.db"));
    format!("sqlite://{}", path.display())
}

impl Config {
    /// Load configuration: defaults, then the TOML file (explicit path or
    /// `VECTORNODE_CONFIG`), then process environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("EMBEDDING_PROVIDER") {
            let provider: Provider = provider.parse().map_err(|e| anyhow!("{}", e))?;
            if provider != self.llm.provider && get("EMBED_MODEL_NAME").is_none() {
                self.llm.embed_model = provider.default_embed_model().to_string();
            }
            self.llm.provider = provider;
        }
        if let Some(key) = get("EMBEDDING_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("EMBEDDING_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(dims) = get("EMBEDDING_DIMENSIONS") {
            self.llm.embedding_dimensions = Some(parse_env("EMBEDDING_DIMENSIONS", &dims)?);
        }
        if let Some(model) = get("CHAT_MODEL_NAME") {
            self.llm.chat_model = model;
        }
        if let Some(model) = get("EMBED_MODEL_NAME") {
            self.llm.embed_model = model;
        }
        if let Some(size) = get("CHUNK_SIZE") {
            self.pipeline.chunk_size = parse_env("CHUNK_SIZE", &size)?;
        }
        if let Some(overlap) = get("CHUNK_OVERLAP") {
            self.pipeline.chunk_overlap = parse_env("CHUNK_OVERLAP", &overlap)?;
        }
        if let Some(workers) = get("WORKER_POOL_SIZE") {
            self.pipeline.worker_pool_size = parse_env("WORKER_POOL_SIZE", &workers)?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.store.database_url = url;
        }
        if let Some(addr) = get("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be positive"));
        }
        if self.pipeline.chunk_overlap >= self.pipeline.chunk_size {
            return Err(anyhow!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.pipeline.chunk_overlap,
                self.pipeline.chunk_size
            ));
        }
        if self.pipeline.worker_pool_size == 0 {
            return Err(anyhow!("worker_pool_size must be at least 1"));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        if self.llm.embedding_dimensions == Some(0) {
            return Err(anyhow!("embedding_dimensions must be positive when set"));
        }
        if self.llm.chat_model.trim().is_empty() || self.llm.embed_model.trim().is_empty() {
            return Err(anyhow!("chat_model and embed_model must not be blank"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))
}
