//! Synchronous half of ingestion
//!
//! Validates a request, embeds the whole content and commits the knowledge
//! base row. Everything after the commit happens asynchronously off the
//! `KB_CREATED` event.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::memory::{MemoryStore, NewKnowledgeBase, Role};
use crate::error::{Error, Result};
use crate::llm::Embedder;

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReceipt {
    pub kb_id: String,
    pub embedding_dim: usize,
    pub processing_ms: u64,
    pub embedding_ms: u64,
}

pub struct IngestService {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
}

impl IngestService {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt> {
        let started = Instant::now();

        if request.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id must not be empty".to_string()));
        }
        if request.content.trim().is_empty() {
            return Err(Error::InvalidInput("content must not be empty".to_string()));
        }
        let mut metadata = match request.metadata {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(Error::InvalidInput("metadata must be a JSON object".to_string()));
            }
        };

        let embed_started = Instant::now();
        let vector = self.embedder.embed(&request.content).await.map_err(|e| {
            warn!(user_id = %request.user_id, error = %e, "Content embedding failed");
            match e {
                Error::AuthFailed(_) | Error::EmbeddingFailed(_) => e,
                other => Error::EmbeddingFailed(other.to_string()),
            }
        })?;
        let embedding_ms = embed_started.elapsed().as_millis() as u64;

        if vector.is_empty() {
            return Err(Error::EmbeddingFailed("provider returned an empty vector".to_string()));
        }

        metadata.insert(
            "content_length".to_string(),
            Value::from(request.content.chars().count()),
        );
        metadata.insert("embedding_dimensions".to_string(), Value::from(vector.len()));
        metadata.insert("embedding_time_ms".to_string(), Value::from(embedding_ms));

        let embedding_dim = vector.len();
        let kb_id = self
            .store
            .insert_kb(NewKnowledgeBase {
                user_id: request.user_id.clone(),
                role: request.role,
                content: request.content,
                vector,
                metadata: Value::Object(metadata),
            })
            .await?;

        let processing_ms = started.elapsed().as_millis() as u64;
        info!(
            kb_id = %kb_id,
            user_id = %request.user_id,
            role = %request.role,
            embedding_dim = embedding_dim,
            processing_ms = processing_ms,
            "Knowledge base entry stored"
        );

        Ok(IngestReceipt {
            kb_id,
            embedding_dim,
            processing_ms,
            embedding_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::memory::SqliteMemoryStore;
    use crate::storage::Database;
    use crate::testing::{FailingEmbedder, FixedEmbedder};
    use serde_json::json;

    async fn service(embedder: Arc<dyn Embedder>) -> (IngestService, Arc<SqliteMemoryStore>) {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteMemoryStore::new(db.pool().clone()));
        (IngestService::new(store.clone(), embedder), store)
    }

    fn request(user_id: &str, content: &str, metadata: Option<Value>) -> IngestRequest {
        IngestRequest {
            user_id: user_id.to_string(),
            role: Role::Agent,
            content: content.to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_ingest_stores_entry_with_metadata() {
        let (service, store) = service(Arc::new(FixedEmbedder::new(vec![0.1, 0.2, 0.3]))).await;

        let receipt = service
            .ingest(request("u1", "Héllo", Some(json!({"source": "chat"}))))
            .await
            .unwrap();
        assert_eq!(receipt.embedding_dim, 3);

        let kb = store.get_kb(&receipt.kb_id).await.unwrap().unwrap();
        assert_eq!(kb.role, Role::Agent);
        assert_eq!(kb.metadata["source"], "chat");
        assert_eq!(kb.metadata["content_length"], 5);
        assert_eq!(kb.metadata["embedding_dimensions"], 3);
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_requests() {
        let (service, store) = service(Arc::new(FixedEmbedder::new(vec![1.0]))).await;

        for bad in [
            request("", "content", None),
            request("u1", "   ", None),
            request("u1", "content", Some(json!(["not", "an", "object"]))),
        ] {
            let err = service.ingest(bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(store.stats().await.unwrap().knowledge_bases, 0);
    }

    #[tokio::test]
    async fn test_embed_failure_writes_nothing() {
        let (service, store) = service(Arc::new(FailingEmbedder)).await;

        let err = service.ingest(request("u1", "hello", None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmbedFailed);
        assert_eq!(store.stats().await.unwrap().knowledge_bases, 0);
        assert_eq!(store.stats().await.unwrap().events_pending, 0);
    }

    #[tokio::test]
    async fn test_empty_vector_is_embed_failure() {
        let (service, _store) = service(Arc::new(FixedEmbedder::new(Vec::new()))).await;
        let err = service.ingest(request("u1", "hello", None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmbedFailed);
    }

    #[test]
    fn test_request_defaults_role() {
        let request: IngestRequest =
            serde_json::from_value(json!({"user_id": "u1", "content": "hi"})).unwrap();
        assert_eq!(request.role, Role::User);
        assert!(request.metadata.is_none());
    }
}
