//! Vectornode Core Library
//!
//! This crate provides the core functionality for Vectornode, including:
//! - Memory store (SQLite, exact cosine search, entity graph)
//! - Change bus (durable outbox with retry and dead-lettering)
//! - Ingestion (front-door, chunker, LLM extraction, worker pool)
//! - Query engine (semantic, temporal, graph and hybrid retrieval)
//! - LLM integration (OpenAI-compatible providers, hot-swappable registry)
//! - Runtime provider setup

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use error::{Error, ErrorKind, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::events::{ChangeEvent, EventBus};
    pub use crate::domain::ingest::{IngestRequest, IngestService, IngestionPipeline, WorkerPool};
    pub use crate::domain::memory::{MemoryStore, Role};
    pub use crate::domain::query::{QueryEngine, QueryResponse, SearchRequest};
    pub use crate::error::{Error, ErrorKind, Result};
}
