//! Retrieval over the memory store
//!
//! Stateless between calls. Semantic operations embed the query text with
//! the active embedder; every other operation is a store read mapped onto
//! `SearchResult` rows.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::memory::{Entity, MemoryStore, Relation};
use crate::error::{Error, Result};
use crate::llm::Embedder;

use super::result::{QueryResponse, ResultKind, SearchResult};

/// Largest accepted `limit`
pub const K_MAX: usize = 100;

/// `limit` used when a semantic request omits it
pub const DEFAULT_LIMIT: usize = 5;

/// Linked entities inherit their context's score scaled by this factor
pub const LINKED_ENTITY_DECAY: f64 = 0.8;

/// Body of a semantic search
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default, alias = "minRelevance")]
    pub min_relevance: Option<f64>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit: Some(limit),
            min_relevance: None,
        }
    }

    fn validate(&self) -> Result<usize> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        if let Some(min) = self.min_relevance
            && !(0.0..=1.0).contains(&min)
        {
            return Err(Error::InvalidInput(format!(
                "min_relevance must be within [0, 1], got {}",
                min
            )));
        }
        check_limit(self.limit.unwrap_or(DEFAULT_LIMIT))
    }

    fn keep(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        match self.min_relevance {
            Some(min) => results.into_iter().filter(|r| r.score >= min).collect(),
            None => results,
        }
    }
}

pub struct QueryEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    // ========== Contexts ==========

    pub async fn search_contexts(&self, request: &SearchRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let k = request.validate()?;
        let vector = self.embedder.embed(&request.query).await?;

        let results = self
            .store
            .knn_contexts(&vector, k)
            .await?
            .into_iter()
            .map(SearchResult::nearest_chunk)
            .collect();

        Ok(respond(&request.query, request.keep(results), started))
    }

    pub async fn search_recent_contexts(
        &self,
        request: &SearchRequest,
        days: u32,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let k = request.validate()?;
        check_window(days, "days")?;
        let vector = self.embedder.embed(&request.query).await?;

        let results = self
            .store
            .knn_recent_contexts(days, &vector, k)
            .await?
            .into_iter()
            .map(SearchResult::nearest_chunk)
            .collect();

        Ok(respond(&request.query, request.keep(results), started))
    }

    pub async fn contexts_by_kb(&self, kb_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        if self.store.get_kb(kb_id).await?.is_none() {
            return Err(Error::KnowledgeBaseNotFound(kb_id.to_string()));
        }

        let results = self
            .store
            .contexts_of_kb(kb_id)
            .await?
            .into_iter()
            .map(|c| SearchResult::chunk(c, 1.0, ResultKind::Chunk))
            .collect();

        Ok(respond(&format!("kb:{}", kb_id), results, started))
    }

    pub async fn recent_contexts(&self, days: u32, limit: Option<usize>) -> Result<QueryResponse> {
        let started = Instant::now();
        check_window(days, "days")?;
        let limit = check_limit(limit.unwrap_or(K_MAX))?;

        let results = self
            .store
            .recent_contexts(days, limit)
            .await?
            .into_iter()
            .map(|c| SearchResult::chunk(c, 1.0, ResultKind::Chunk))
            .collect();

        Ok(respond(&format!("recent:{}days", days), results, started))
    }

    /// Contexts created within `[start, end]`; bounds are RFC 3339 or `YYYY-MM-DD`
    pub async fn contexts_by_range(
        &self,
        start: &str,
        end: &str,
        limit: Option<usize>,
    ) -> Result<QueryResponse> {
        let started = Instant::now();
        let from = parse_instant(start)?;
        let to = parse_instant(end)?;
        if from > to {
            return Err(Error::InvalidInput(format!(
                "range start {} is after its end {}",
                start, end
            )));
        }
        let limit = check_limit(limit.unwrap_or(K_MAX))?;

        let results = self
            .store
            .contexts_between(from, to, limit)
            .await?
            .into_iter()
            .map(|c| SearchResult::chunk(c, 1.0, ResultKind::Chunk))
            .collect();

        Ok(respond(&format!("range:{}_to_{}", start, end), results, started))
    }

    pub async fn siblings(&self, context_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        if self.store.get_context(context_id).await?.is_none() {
            return Err(Error::ContextNotFound(context_id.to_string()));
        }

        let results = self
            .store
            .siblings(context_id)
            .await?
            .into_iter()
            .map(|c| SearchResult::chunk(c, 1.0, ResultKind::SiblingChunk))
            .collect();

        Ok(respond(&format!("siblings:{}", context_id), results, started))
    }

    pub async fn entities_for_context(&self, context_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        if self.store.get_context(context_id).await?.is_none() {
            return Err(Error::ContextNotFound(context_id.to_string()));
        }

        let results = self
            .store
            .entities_of_context(context_id)
            .await?
            .into_iter()
            .map(|e| {
                SearchResult::new(Some(e.id), e.name, 1.0, ResultKind::ContextEntity)
                    .with("entityType", e.entity_type)
            })
            .collect();

        Ok(respond(&format!("context_entities:{}", context_id), results, started))
    }

    // ========== Entities ==========

    pub async fn search_entities(&self, request: &SearchRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let k = request.validate()?;
        let vector = self.embedder.embed(&request.query).await?;

        let results = self
            .store
            .knn_entities(&vector, k)
            .await?
            .into_iter()
            .map(|n| {
                let score = n.score();
                SearchResult::entity(n.row, score, ResultKind::Entity)
            })
            .collect();

        Ok(respond(&request.query, request.keep(results), started))
    }

    pub async fn entity_by_name(&self, name: &str, ignore_case: bool) -> Result<Entity> {
        debug!(name = %name, ignore_case = ignore_case, "Looking up entity by name");
        self.store
            .entity_by_name(name, ignore_case)
            .await?
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    /// The entity called `name` whose vector is nearest to the embedding of `context_text`
    pub async fn disambiguate(&self, name: &str, context_text: &str) -> Result<Entity> {
        if name.trim().is_empty() || context_text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "entity name and context text must not be empty".to_string(),
            ));
        }
        let vector = self.embedder.embed(context_text).await?;

        self.store
            .disambiguate(name, &vector)
            .await?
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }

    pub async fn contexts_for_entity(&self, entity_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        self.require_entity(entity_id).await?;

        let results = self
            .store
            .contexts_of_entity(entity_id)
            .await?
            .into_iter()
            .map(|c| SearchResult::new(Some(c.id), c.text_chunk, 1.0, ResultKind::EntityContext))
            .collect();

        Ok(respond(&format!("entity_contexts:{}", entity_id), results, started))
    }

    pub async fn merge_entities(&self, source_id: &str, target_id: &str) -> Result<()> {
        info!(source = %source_id, target = %target_id, "Merging entities");
        self.store.merge_entity(source_id, target_id).await
    }

    // ========== History ==========

    pub async fn search_history(&self, request: &SearchRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let k = request.validate()?;
        let vector = self.embedder.embed(&request.query).await?;

        let results = self
            .store
            .knn_kbs(&vector, k)
            .await?
            .into_iter()
            .map(|n| {
                let score = n.score();
                SearchResult::history(n.row, score)
            })
            .collect();

        Ok(respond(&request.query, request.keep(results), started))
    }

    pub async fn history_by_user(&self, user_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        let results = self
            .store
            .kbs_of_user(user_id)
            .await?
            .into_iter()
            .map(|kb| SearchResult::history(kb, 1.0))
            .collect();

        Ok(respond(&format!("user:{}", user_id), results, started))
    }

    pub async fn recent_kbs(&self, hours: u32, limit: Option<usize>) -> Result<QueryResponse> {
        let started = Instant::now();
        check_window(hours, "hours")?;
        let limit = check_limit(limit.unwrap_or(K_MAX))?;

        let results = self
            .store
            .recent_kbs(hours, limit)
            .await?
            .into_iter()
            .map(|kb| SearchResult::history(kb, 1.0))
            .collect();

        Ok(respond(&format!("recent:{}hours", hours), results, started))
    }

    pub async fn kbs_since(&self, since: &str, limit: Option<usize>) -> Result<QueryResponse> {
        let started = Instant::now();
        let from = parse_instant(since)?;
        let limit = check_limit(limit.unwrap_or(K_MAX))?;

        let results = self
            .store
            .kbs_since(from, limit)
            .await?
            .into_iter()
            .map(|kb| SearchResult::history(kb, 1.0))
            .collect();

        Ok(respond(&format!("since:{}", since), results, started))
    }

    /// Delete every entry of the user; returns how many entries were removed
    pub async fn delete_user_data(&self, user_id: &str) -> Result<u64> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".to_string()));
        }
        let deleted = self.store.delete_by_user(user_id).await?;
        info!(user_id = %user_id, deleted = deleted, "User data deleted");
        Ok(deleted)
    }

    // ========== Graph ==========

    pub async fn outgoing(&self, entity_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        self.require_entity(entity_id).await?;

        let results = self
            .store
            .out_edges(entity_id)
            .await?
            .into_iter()
            .map(|r| SearchResult::edge(r, true))
            .collect();

        Ok(respond(&format!("outgoing:{}", entity_id), results, started))
    }

    pub async fn incoming(&self, entity_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        self.require_entity(entity_id).await?;

        let results = self
            .store
            .in_edges(entity_id)
            .await?
            .into_iter()
            .map(|r| SearchResult::edge(r, false))
            .collect();

        Ok(respond(&format!("incoming:{}", entity_id), results, started))
    }

    pub async fn two_hop(&self, entity_id: &str) -> Result<QueryResponse> {
        let started = Instant::now();
        self.require_entity(entity_id).await?;

        let results = self
            .store
            .two_hop(entity_id)
            .await?
            .into_iter()
            .map(|e| SearchResult::new(Some(e.id), e.name, 1.0, ResultKind::TwoHopEntity))
            .collect();

        Ok(respond(&format!("2hop:{}", entity_id), results, started))
    }

    pub async fn top_relations(&self, limit: usize) -> Result<QueryResponse> {
        let started = Instant::now();
        let limit = check_limit(limit)?;

        let results = self
            .store
            .top_edges(limit)
            .await?
            .into_iter()
            .map(SearchResult::top_relation)
            .collect();

        Ok(respond("top_relations", results, started))
    }

    pub async fn relations_by_source(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.store.relations_by_source(entity_id).await
    }

    pub async fn relations_by_target(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.store.relations_by_target(entity_id).await
    }

    pub async fn relations_by_type(
        &self,
        relation_type: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Relation>> {
        let limit = check_limit(limit.unwrap_or(K_MAX))?;
        self.store.relations_by_type(relation_type, limit).await
    }

    // ========== Hybrid ==========

    /// Nearest chunks, then the entities linked to each chunk, then the nearest entities.
    ///
    /// Rows keep composition order and are not deduplicated, so an entity can
    /// appear both as `LINKED_ENTITY` and `SIMILAR_ENTITY`.
    pub async fn hybrid_search(&self, request: &SearchRequest) -> Result<QueryResponse> {
        let started = Instant::now();
        let k = request.validate()?;
        let vector = self.embedder.embed(&request.query).await?;

        let neighbors = self.store.knn_contexts(&vector, k).await?;
        let mut chunks = Vec::with_capacity(neighbors.len());
        let mut linked = Vec::new();

        for neighbor in neighbors {
            let context_score = neighbor.score();
            for entity in self.store.entities_of_context(&neighbor.row.id).await? {
                linked.push(
                    SearchResult::new(
                        Some(entity.id),
                        entity.name,
                        context_score * LINKED_ENTITY_DECAY,
                        ResultKind::LinkedEntity,
                    )
                    .with("entityType", entity.entity_type)
                    .with("contextId", neighbor.row.id.clone()),
                );
            }
            chunks.push(SearchResult::nearest_chunk(neighbor));
        }

        let similar = self
            .store
            .knn_entities(&vector, k)
            .await?
            .into_iter()
            .map(|n| {
                let score = n.score();
                SearchResult::entity(n.row, score, ResultKind::SimilarEntity)
            });

        let mut results = chunks;
        results.extend(linked);
        results.extend(similar);

        info!(
            query = %request.query,
            results = results.len(),
            "Hybrid search complete"
        );
        Ok(respond(&request.query, request.keep(results), started))
    }

    async fn require_entity(&self, entity_id: &str) -> Result<()> {
        match self.store.get_entity(entity_id).await? {
            Some(_) => Ok(()),
            None => Err(Error::EntityNotFound(entity_id.to_string())),
        }
    }
}

fn respond(query: &str, results: Vec<SearchResult>, started: Instant) -> QueryResponse {
    let processing_time_ms = started.elapsed().as_millis() as u64;
    debug!(
        query = %query,
        results = results.len(),
        processing_time_ms = processing_time_ms,
        "Query complete"
    );
    QueryResponse {
        query: query.to_string(),
        results,
        processing_time_ms,
    }
}

fn check_limit(limit: usize) -> Result<usize> {
    if limit == 0 || limit > K_MAX {
        return Err(Error::InvalidInput(format!(
            "limit must be between 1 and {}, got {}",
            K_MAX, limit
        )));
    }
    Ok(limit)
}

fn check_window(value: u32, unit: &str) -> Result<()> {
    if value == 0 {
        return Err(Error::InvalidInput(format!("{} must be positive", unit)));
    }
    Ok(())
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC), or a bare date (midnight UTC)
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }
    Err(Error::InvalidInput(format!(
        "'{}' is not a timestamp (expected RFC 3339 or YYYY-MM-DD)",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::{NewContext, NewEntity, NewKnowledgeBase, Role};
    use crate::error::ErrorKind;
    use crate::infrastructure::memory::SqliteMemoryStore;
    use crate::storage::Database;
    use crate::testing::FixedEmbedder;
    use serde_json::json;

    async fn fixture() -> (QueryEngine, Arc<SqliteMemoryStore>) {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteMemoryStore::new(db.pool().clone()));
        let engine = QueryEngine::new(store.clone(), Arc::new(FixedEmbedder::new(vec![1.0, 0.0])));
        (engine, store)
    }

    async fn seed_context(store: &SqliteMemoryStore, text: &str, vector: Vec<f32>) -> String {
        let kb = store
            .insert_kb(NewKnowledgeBase {
                user_id: "u1".to_string(),
                role: Role::User,
                content: text.to_string(),
                vector: vector.clone(),
                metadata: json!({}),
            })
            .await
            .unwrap();
        store
            .insert_contexts(
                &kb,
                vec![NewContext {
                    chunk_index: 0,
                    text_chunk: text.to_string(),
                    vector,
                    metadata: json!({}),
                }],
            )
            .await
            .unwrap()
            .remove(0)
    }

    async fn seed_entity(
        store: &SqliteMemoryStore,
        name: &str,
        vector: Vec<f32>,
        context_id: &str,
    ) -> String {
        store
            .find_or_link_entity(
                NewEntity {
                    name: name.to_string(),
                    entity_type: "CONCEPT".to_string(),
                    description: String::new(),
                    vector,
                    metadata: json!({}),
                },
                context_id,
            )
            .await
            .unwrap()
            .entity_id
    }

    #[tokio::test]
    async fn test_limit_and_query_validation() {
        let (engine, _) = fixture().await;

        for request in [
            SearchRequest::new("q", 0),
            SearchRequest::new("q", K_MAX + 1),
            SearchRequest::new("   ", 5),
        ] {
            let err = engine.search_contexts(&request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert!(engine.search_contexts(&SearchRequest::new("q", K_MAX)).await.is_ok());
        assert_eq!(
            engine.recent_contexts(0, None).await.unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[tokio::test]
    async fn test_oversized_time_windows_are_rejected() {
        let (engine, _) = fixture().await;

        assert_eq!(
            engine.recent_kbs(u32::MAX, None).await.unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            engine.recent_contexts(200_000_000, None).await.unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        let request = SearchRequest::new("q", 5);
        assert_eq!(
            engine
                .search_recent_contexts(&request, u32::MAX)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
        assert!(engine.recent_kbs(24, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let (engine, _) = fixture().await;

        assert_eq!(engine.contexts_by_kb("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.siblings("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.outgoing("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(engine.two_hop("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            engine.entity_by_name("nobody", true).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_hybrid_composition() {
        let (engine, store) = fixture().await;
        let near = seed_context(&store, "near", vec![1.0, 0.0]).await;
        let far = seed_context(&store, "far", vec![0.0, 1.0]).await;
        seed_entity(&store, "Alpha", vec![1.0, 0.0], &near).await;
        seed_entity(&store, "Beta", vec![0.0, 1.0], &near).await;
        seed_entity(&store, "Gamma", vec![0.6, 0.8], &far).await;

        let response = engine.hybrid_search(&SearchRequest::new("q", 2)).await.unwrap();
        let kinds: Vec<ResultKind> = response.results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResultKind::Chunk,
                ResultKind::Chunk,
                ResultKind::LinkedEntity,
                ResultKind::LinkedEntity,
                ResultKind::LinkedEntity,
                ResultKind::SimilarEntity,
                ResultKind::SimilarEntity,
            ]
        );

        let chunk_score = response.results[0].score;
        assert_eq!(response.results[0].content, "near");
        let linked: Vec<&SearchResult> = response
            .results
            .iter()
            .filter(|r| r.kind == ResultKind::LinkedEntity && r.metadata["contextId"] == near.as_str())
            .collect();
        assert_eq!(linked.len(), 2);
        for row in linked {
            assert!((row.score - chunk_score * LINKED_ENTITY_DECAY).abs() < 1e-9);
        }
        assert_eq!(response.results[5].content, "Alpha");
    }

    #[tokio::test]
    async fn test_min_relevance_filters_semantic_results() {
        let (engine, store) = fixture().await;
        seed_context(&store, "near", vec![1.0, 0.0]).await;
        seed_context(&store, "far", vec![0.0, 1.0]).await;

        let mut request = SearchRequest::new("q", 5);
        request.min_relevance = Some(0.5);
        let response = engine.search_contexts(&request).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].content, "near");
        assert_eq!(response.results[0].metadata["chunkIndex"], 0);

        request.min_relevance = Some(1.5);
        assert!(engine.search_contexts(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_graph_results() {
        let (engine, store) = fixture().await;
        let ctx = seed_context(&store, "abc", vec![1.0, 0.0]).await;
        let a = seed_entity(&store, "A", vec![1.0, 0.0], &ctx).await;
        let b = seed_entity(&store, "B", vec![1.0, 0.0], &ctx).await;
        let c = seed_entity(&store, "C", vec![1.0, 0.0], &ctx).await;
        let later = seed_context(&store, "ab again", vec![1.0, 0.0]).await;
        store.upsert_relation(&a, &b, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&a, &b, "KNOWS", &later).await.unwrap();
        store.upsert_relation(&b, &c, "KNOWS", &ctx).await.unwrap();

        let out = engine.outgoing(&a).await.unwrap();
        assert_eq!(out.query, format!("outgoing:{}", a));
        assert_eq!(out.results[0].content, "B");
        assert_eq!(out.results[0].score, 2.0);

        let incoming = engine.incoming(&c).await.unwrap();
        assert_eq!(incoming.results[0].content, "B");

        let two_hop = engine.two_hop(&a).await.unwrap();
        assert_eq!(two_hop.results.len(), 1);
        assert_eq!(two_hop.results[0].content, "C");
        assert_eq!(two_hop.results[0].kind, ResultKind::TwoHopEntity);

        let top = engine.top_relations(1).await.unwrap();
        assert_eq!(top.results[0].content, "A -> B");
        assert_eq!(top.results[0].score, 2.0);

        assert_eq!(engine.relations_by_type("KNOWS", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_history_by_user_and_delete() {
        let (engine, store) = fixture().await;
        seed_context(&store, "first", vec![1.0, 0.0]).await;

        let history = engine.history_by_user("u1").await.unwrap();
        assert_eq!(history.query, "user:u1");
        assert_eq!(history.results[0].metadata["role"], "USER");

        assert_eq!(engine.delete_user_data("u1").await.unwrap(), 1);
        assert!(engine.history_by_user("u1").await.unwrap().results.is_empty());
    }

    #[test]
    fn test_parse_instant() {
        let date = parse_instant("2024-03-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let ts = parse_instant("2024-03-01T12:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:30:00+00:00");
        assert!(parse_instant("2024-03-01T12:30:00").is_ok());
        assert_eq!(parse_instant("yesterday").unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
