//! Supported embedding/chat providers and their endpoint conventions

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Azure OpenAI REST API version used for deployment endpoints
pub const AZURE_API_VERSION: &str = "2024-02-01";

/// LLM provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    #[default]
    #[serde(rename = "OPENAI")]
    OpenAi,
    Gemini,
    Azure,
    Ollama,
    Mistral,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
            Self::Azure => "AZURE",
            Self::Ollama => "OLLAMA",
            Self::Mistral => "MISTRAL",
        }
    }

    /// Default API root; Azure has no public default and must be configured
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Azure => "https://localhost.openai.azure.com",
            Self::Ollama => "http://localhost:11434/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
        }
    }

    pub fn default_embed_model(&self) -> &'static str {
        match self {
            Self::OpenAi | Self::Azure => "text-embedding-3-small",
            Self::Gemini => "text-embedding-004",
            Self::Ollama => "nomic-embed-text",
            Self::Mistral => "mistral-embed",
        }
    }

    /// Local Ollama accepts unauthenticated requests
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Full URL of the embeddings endpoint for `model`
    pub fn embeddings_url(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Azure => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                base, model, AZURE_API_VERSION
            ),
            _ => format!("{}/embeddings", base),
        }
    }

    /// Full URL of the chat completions endpoint for `model`
    pub fn chat_url(&self, base_url: &str, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, model, AZURE_API_VERSION
            ),
            _ => format!("{}/chat/completions", base),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPENAI" => Ok(Self::OpenAi),
            "GEMINI" => Ok(Self::Gemini),
            "AZURE" => Ok(Self::Azure),
            "OLLAMA" => Ok(Self::Ollama),
            "MISTRAL" => Ok(Self::Mistral),
            _ => Err(Error::UnknownProvider(s.to_string())),
        }
    }
}
