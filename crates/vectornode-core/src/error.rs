//! Error types for Vectornode

use thiserror::Error;

/// Result type alias using Vectornode's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds surfaced by the memory service.
///
/// Several concrete errors share a kind; callers at the edge (HTTP, CLI)
/// dispatch on the kind, never on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    EmbedFailed,
    ExtractDegraded,
    StoreFailed,
    StoreConflict,
    AuthFailed,
    NotFound,
    PipelineDropped,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::EmbedFailed => "EMBED_FAILED",
            Self::ExtractDegraded => "EXTRACT_DEGRADED",
            Self::StoreFailed => "STORE_FAILED",
            Self::StoreConflict => "STORE_CONFLICT",
            Self::AuthFailed => "AUTH_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::PipelineDropped => "PIPELINE_DROPPED",
            Self::Upstream => "LLM_UPSTREAM",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vectornode error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E100-E199)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown provider '{0}'. Expected one of OPENAI, GEMINI, AZURE, OLLAMA, MISTRAL.")]
    UnknownProvider(String),

    // Lookup errors (E200-E299)
    #[error("Knowledge base entry '{0}' not found")]
    KnowledgeBaseNotFound(String),

    #[error("Context '{0}' not found")]
    ContextNotFound(String),

    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    // Provider errors (E300-E399)
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}")]
    LLMError(String),

    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    #[error("Provider rejected credentials: {0}")]
    AuthFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Extraction output unusable: {0}")]
    ExtractionDegraded(String),

    // Store errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Pipeline errors (E500-E599)
    #[error("Event {0} exhausted its retry budget and was dead-lettered")]
    PipelineDropped(i64),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E100",
            Self::UnknownProvider(_) => "E101",
            Self::KnowledgeBaseNotFound(_) => "E200",
            Self::ContextNotFound(_) => "E201",
            Self::EntityNotFound(_) => "E202",
            Self::NetworkError(_) => "E300",
            Self::LLMError(_) => "E301",
            Self::ProviderUnavailable(_) => "E302",
            Self::RateLimited(_) => "E303",
            Self::AuthFailed(_) => "E304",
            Self::EmbeddingFailed(_) => "E305",
            Self::ExtractionDegraded(_) => "E306",
            Self::DatabaseError(_) => "E400",
            Self::Conflict(_) => "E401",
            Self::PipelineDropped(_) => "E500",
            Self::ConfigError(_) => "E600",
            Self::Serialization(_) => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Map the concrete error onto the service's failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::UnknownProvider(_) => ErrorKind::InvalidInput,
            Self::KnowledgeBaseNotFound(_) | Self::ContextNotFound(_) | Self::EntityNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::AuthFailed(_) => ErrorKind::AuthFailed,
            Self::EmbeddingFailed(_) => ErrorKind::EmbedFailed,
            Self::ExtractionDegraded(_) => ErrorKind::ExtractDegraded,
            Self::NetworkError(_)
            | Self::LLMError(_)
            | Self::ProviderUnavailable(_)
            | Self::RateLimited(_) => ErrorKind::Upstream,
            Self::DatabaseError(_) if self.is_unique_violation() => ErrorKind::StoreConflict,
            Self::DatabaseError(_) => ErrorKind::StoreFailed,
            Self::Conflict(_) => ErrorKind::StoreConflict,
            Self::PipelineDropped(_) => ErrorKind::PipelineDropped,
            Self::ConfigError(_) | Self::Serialization(_) | Self::Other(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether this is a unique-constraint violation raised by the store
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::DatabaseError(sqlx::Error::Database(db)) => db.is_unique_violation(),
            Self::Conflict(_) => true,
            _ => false,
        }
    }

    /// Whether retrying the same provider call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(e) => !e.is_builder() && !e.is_decode(),
            Self::ProviderUnavailable(_) | Self::RateLimited(_) => true,
            _ => false,
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownProvider(_) => Some("Set EMBEDDING_PROVIDER to a supported provider".to_string()),
            Self::AuthFailed(_) => Some("Check EMBEDDING_API_KEY or POST /api/setup with a valid key".to_string()),
            Self::NetworkError(_) => Some("Check EMBEDDING_BASE_URL and network connectivity".to_string()),
            Self::PipelineDropped(_) => Some("vectornode replay --dead".to_string()),
            _ => None,
        }
    }
}
