//! Query response shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::memory::{Context, Entity, KnowledgeBase, Neighbor, Relation};

/// What a search result row represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Chunk,
    SiblingChunk,
    Entity,
    KnowledgeBase,
    Relation,
    TwoHopEntity,
    TopRelation,
    LinkedEntity,
    SimilarEntity,
    EntityContext,
    ContextEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    pub score: f64,
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    pub fn new(id: Option<String>, content: impl Into<String>, score: f64, kind: ResultKind) -> Self {
        Self {
            id,
            content: content.into(),
            score,
            kind,
            metadata: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn chunk(context: Context, score: f64, kind: ResultKind) -> Self {
        let index = context.chunk_index;
        Self::new(Some(context.id), context.text_chunk, score, kind).with("chunkIndex", index)
    }

    pub(crate) fn entity(entity: Entity, score: f64, kind: ResultKind) -> Self {
        Self::new(Some(entity.id), entity.name, score, kind)
            .with("entityType", entity.entity_type)
            .with("description", entity.description)
    }

    pub(crate) fn history(kb: KnowledgeBase, score: f64) -> Self {
        Self::new(Some(kb.id), kb.content, score, ResultKind::KnowledgeBase)
            .with("uid", kb.user_id)
            .with("role", kb.role.as_str())
    }

    /// Edge rendered from one endpoint's point of view; `content` is the other endpoint
    pub(crate) fn edge(relation: Relation, outgoing: bool) -> Self {
        let (id, name) = if outgoing {
            (relation.target_id, relation.target_name)
        } else {
            (relation.source_id, relation.source_name)
        };
        Self::new(Some(id), name, relation.edge_weight as f64, ResultKind::Relation)
            .with("relationType", relation.relation_type)
            .with("relationId", relation.id)
    }

    pub(crate) fn top_relation(relation: Relation) -> Self {
        Self::new(
            Some(relation.id),
            format!("{} -> {}", relation.source_name, relation.target_name),
            relation.edge_weight as f64,
            ResultKind::TopRelation,
        )
        .with("relationType", relation.relation_type)
    }

    pub(crate) fn nearest_chunk(neighbor: Neighbor<Context>) -> Self {
        let score = neighbor.score();
        Self::chunk(neighbor.row, score, ResultKind::Chunk)
    }
}

/// Envelope returned by every query operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn relation() -> Relation {
        Relation {
            id: "r1".to_string(),
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            source_name: "Alice".to_string(),
            target_name: "Bob".to_string(),
            relation_type: "KNOWS".to_string(),
            edge_weight: 3,
            metadata: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_edge_content_is_other_endpoint() {
        let out = SearchResult::edge(relation(), true);
        assert_eq!(out.content, "Bob");
        assert_eq!(out.id.as_deref(), Some("b"));
        assert_eq!(out.score, 3.0);

        let incoming = SearchResult::edge(relation(), false);
        assert_eq!(incoming.content, "Alice");
        assert_eq!(incoming.metadata["relationType"], "KNOWS");
    }

    #[test]
    fn test_wire_format() {
        let result = SearchResult::top_relation(relation());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "TOP_RELATION");
        assert_eq!(json["content"], "Alice -> Bob");

        let bare = SearchResult::new(None, "C", 1.0, ResultKind::TwoHopEntity);
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["kind"], "TWO_HOP_ENTITY");

        let response = QueryResponse {
            query: "q".to_string(),
            results: vec![],
            processing_time_ms: 4,
        };
        assert_eq!(serde_json::to_value(&response).unwrap()["processingTimeMs"], 4);
    }
}
