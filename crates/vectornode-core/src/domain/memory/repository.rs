//! Repository trait for the memory store
//!
//! The trait abstracts the relational+vector backend. Writes are
//! transactional; reads are single statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;

use super::model::{
    Context, Entity, EntityLink, KnowledgeBase, Neighbor, NewContext, NewEntity,
    NewKnowledgeBase, Relation, StoreStats,
};

/// Persistence and retrieval over the four-tier memory model
#[async_trait]
pub trait MemoryStore: Send + Sync {
    // ========== Write Operations ==========

    /// Insert a knowledge base entry; emits `KB_CREATED` on commit
    async fn insert_kb(&self, kb: NewKnowledgeBase) -> Result<String>;

    /// Insert the chunks of a knowledge base entry in one transaction.
    ///
    /// Rows whose `(kb_id, chunk_index)` already exists are left untouched and
    /// emit no event; their existing ids are returned in input order.
    async fn insert_contexts(&self, kb_id: &str, rows: Vec<NewContext>) -> Result<Vec<String>>;

    /// Insert the entity if its name is new, then link it to the context
    async fn find_or_link_entity(&self, entity: NewEntity, context_id: &str) -> Result<EntityLink>;

    /// Record that `context_id` observed the edge and return its weight.
    ///
    /// The weight counts distinct observing contexts: the first observation
    /// creates the edge with weight 1, each new context adds 1, and repeating
    /// an observation leaves the weight unchanged.
    async fn upsert_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        context_id: &str,
    ) -> Result<i64>;

    /// Merge `patch` into a context's metadata object (RFC 7396 semantics)
    async fn annotate_context(&self, context_id: &str, patch: &Value) -> Result<()>;

    /// Move every link and relation of `source_id` onto `target_id`, then delete `source_id`
    async fn merge_entity(&self, source_id: &str, target_id: &str) -> Result<()>;

    /// Delete every knowledge base entry of a user (contexts cascade); returns the KB count
    async fn delete_by_user(&self, user_id: &str) -> Result<u64>;

    // ========== Lookups ==========

    async fn get_kb(&self, id: &str) -> Result<Option<KnowledgeBase>>;

    async fn get_context(&self, id: &str) -> Result<Option<Context>>;

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>>;

    async fn entity_by_name(&self, name: &str, ignore_case: bool) -> Result<Option<Entity>>;

    /// Contexts of one entry ordered by `chunk_index`
    async fn contexts_of_kb(&self, kb_id: &str) -> Result<Vec<Context>>;

    /// Entries of one user, newest first
    async fn kbs_of_user(&self, user_id: &str) -> Result<Vec<KnowledgeBase>>;

    // ========== Vector Search ==========

    async fn knn_contexts(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<Context>>>;

    async fn knn_entities(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<Entity>>>;

    async fn knn_kbs(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<KnowledgeBase>>>;

    /// Nearest contexts created in the last `days` days
    async fn knn_recent_contexts(
        &self,
        days: u32,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor<Context>>>;

    /// Among entities whose name matches (ignoring case), the one nearest `context_vector`
    async fn disambiguate(&self, name: &str, context_vector: &[f32]) -> Result<Option<Entity>>;

    // ========== Time Filters (newest first) ==========

    async fn recent_contexts(&self, days: u32, limit: usize) -> Result<Vec<Context>>;

    async fn contexts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Context>>;

    async fn recent_kbs(&self, hours: u32, limit: usize) -> Result<Vec<KnowledgeBase>>;

    async fn kbs_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<KnowledgeBase>>;

    // ========== Graph Joins ==========

    /// Edges leaving the entity, heaviest first
    async fn out_edges(&self, entity_id: &str) -> Result<Vec<Relation>>;

    /// Edges entering the entity, heaviest first
    async fn in_edges(&self, entity_id: &str) -> Result<Vec<Relation>>;

    /// Distinct entities reachable over exactly two directed edges
    async fn two_hop(&self, entity_id: &str) -> Result<Vec<Entity>>;

    /// Heaviest edges; ties by `source_id` then `target_id`
    async fn top_edges(&self, k: usize) -> Result<Vec<Relation>>;

    /// Other contexts of the same entry ordered by `chunk_index`
    async fn siblings(&self, context_id: &str) -> Result<Vec<Context>>;

    async fn contexts_of_entity(&self, entity_id: &str) -> Result<Vec<Context>>;

    async fn entities_of_context(&self, context_id: &str) -> Result<Vec<Entity>>;

    async fn relations_by_source(&self, entity_id: &str) -> Result<Vec<Relation>>;

    async fn relations_by_target(&self, entity_id: &str) -> Result<Vec<Relation>>;

    async fn relations_by_type(&self, relation_type: &str, limit: usize) -> Result<Vec<Relation>>;

    // ========== Statistics ==========

    async fn stats(&self) -> Result<StoreStats>;
}
