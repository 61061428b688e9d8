//! Memory model: knowledge base entries, contexts, entities and relations

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Who authored a knowledge base entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Agent,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Agent => "AGENT",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "AGENT" => Ok(Self::Agent),
            "SYSTEM" => Ok(Self::System),
            other => Err(Error::InvalidInput(format!(
                "Unknown role '{}'. Expected USER, AGENT or SYSTEM.",
                other
            ))),
        }
    }
}

/// A single user utterance or document submission
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// An embedded chunk of a knowledge base entry
#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub id: String,
    pub kb_id: String,
    pub chunk_index: i64,
    pub text_chunk: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A deduplicated concept referenced from one or more contexts
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A directed, typed, weighted edge between two entities
///
/// Endpoint names are joined in by the store so callers can render the
/// edge without another lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Relation {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub source_name: String,
    pub target_name: String,
    pub relation_type: String,
    pub edge_weight: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for `MemoryStore::insert_kb`
#[derive(Debug, Clone)]
pub struct NewKnowledgeBase {
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// One row of a batched `MemoryStore::insert_contexts`
#[derive(Debug, Clone)]
pub struct NewContext {
    pub chunk_index: i64,
    pub text_chunk: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// Input for `MemoryStore::find_or_link_entity`
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

/// Outcome of linking an extracted entity to a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLink {
    pub entity_id: String,
    /// `true` when this call inserted the entity row
    pub created: bool,
}

/// A row returned by a nearest-neighbour search
#[derive(Debug, Clone)]
pub struct Neighbor<T> {
    pub row: T,
    /// Cosine distance, `1 - cos(q, v)`
    pub distance: f64,
}

impl<T> Neighbor<T> {
    /// Similarity score in `[0, 1]`
    pub fn score(&self) -> f64 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }
}

/// Row counts across the store, including change bus backlog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub knowledge_bases: i64,
    pub contexts: i64,
    pub entities: i64,
    pub entity_links: i64,
    pub relations: i64,
    pub events_pending: i64,
    pub events_in_flight: i64,
    pub events_dead: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!(" Agent ".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!("SYSTEM".parse::<Role>().unwrap(), Role::System);
        assert!("robot".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"AGENT\"");
        let role: Role = serde_json::from_str("\"SYSTEM\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_neighbor_score_is_clamped() {
        let exact = Neighbor { row: (), distance: 0.0 };
        let opposite = Neighbor { row: (), distance: 2.0 };
        let near = Neighbor { row: (), distance: 0.25 };
        assert_eq!(exact.score(), 1.0);
        assert_eq!(opposite.score(), 0.0);
        assert!((near.score() - 0.75).abs() < 1e-9);
    }
}
