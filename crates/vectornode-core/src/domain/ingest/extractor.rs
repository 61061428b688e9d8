//! LLM-backed entity and relation extraction
//!
//! `Extractor::extract` is total: transport failures, fenced or chatty
//! replies, missing arrays and malformed elements all degrade to fewer (or
//! zero) results instead of an error.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::llm::ChatModel;

pub const DEFAULT_ENTITY_TYPE: &str = "OTHER";
pub const DEFAULT_RELATION_TYPE: &str = "RELATED_TO";

const EXTRACTION_PROMPT: &str = r#"You are a knowledge graph extraction system. Extract entities and relations from the following text.

TEXT:
{text}

Respond ONLY with valid JSON in this exact format (no markdown, no explanation):
{
  "entities": [
    {"name": "Entity Name", "type": "PERSON|ORGANIZATION|LOCATION|CONCEPT|EVENT|OTHER", "description": "Brief description"}
  ],
  "relations": [
    {"source": "Source Entity Name", "target": "Target Entity Name", "relation": "RELATION_TYPE"}
  ],
  "metadata": {
    "topics": ["topic"],
    "keywords": ["keyword"],
    "sentiment": "positive|neutral|negative",
    "language": "ISO 639-1 code",
    "content_type": "conversation|document|note|other",
    "summary": "One sentence summary"
  }
}

Rules:
- Extract only clearly stated entities and relationships
- Use simple, normalized entity names
- Relation types should be uppercase with underscores (e.g., WORKS_FOR, LOCATED_IN, PART_OF)
- Every relation source and target must also appear in entities
- If no entities found, return empty arrays"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRelation {
    pub source_name: String,
    pub target_name: String,
    pub relation_type: String,
}

/// Document-level annotations; every field is optional in the model output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionMetadata {
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub sentiment: Option<String>,
    pub language: Option<String>,
    pub content_type: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Turns a chunk of text into entities and relations via the chat model
#[derive(Clone)]
pub struct Extractor {
    chat: Arc<dyn ChatModel>,
}

impl Extractor {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub async fn extract(&self, text: &str) -> Extraction {
        debug!(text_length = text.len(), "Extracting entities");

        match self.chat.complete(&build_prompt(text)).await {
            Ok(reply) => parse_extraction(&reply),
            Err(e) => {
                warn!(
                    kind = %ErrorKind::ExtractDegraded,
                    error = %e,
                    "Extraction call failed; continuing with an empty result"
                );
                Extraction::default()
            }
        }
    }
}

pub fn build_prompt(text: &str) -> String {
    EXTRACTION_PROMPT.replace("{text}", text)
}

/// Remove leading and trailing markdown code fences
pub fn strip_fences(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a model reply, keeping the first of each well-formed element
///
/// Entities repeat when their names match ignoring case; relations repeat
/// when both endpoint names match ignoring case and the types are equal.
pub fn parse_extraction(raw: &str) -> Extraction {
    let body = strip_fences(raw);

    let root = match serde_json::from_str::<Value>(body) {
        Ok(root) => root,
        // Models sometimes wrap the object in prose
        Err(_) => match (body.find('{'), body.rfind('}')) {
            (Some(open), Some(close)) if open < close => {
                match serde_json::from_str::<Value>(&body[open..=close]) {
                    Ok(root) => root,
                    Err(e) => return degraded(&e.to_string()),
                }
            }
            _ => return degraded("reply contains no JSON object"),
        },
    };

    let mut seen_names = HashSet::new();
    let entities: Vec<ExtractedEntity> = elements(&root, "entities")
        .filter_map(|e| {
            let name = text_field(e, &["name"])?;
            Some(ExtractedEntity {
                name,
                entity_type: text_field(e, &["type", "entity_type"])
                    .map(|t| t.to_uppercase())
                    .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
                description: text_field(e, &["description"]).unwrap_or_default(),
            })
        })
        .filter(|e| seen_names.insert(e.name.to_lowercase()))
        .collect();

    let mut seen_edges = HashSet::new();
    let relations: Vec<ExtractedRelation> = elements(&root, "relations")
        .filter_map(|r| {
            Some(ExtractedRelation {
                source_name: text_field(r, &["source", "source_name"])?,
                target_name: text_field(r, &["target", "target_name"])?,
                relation_type: text_field(r, &["relation", "relation_type", "type"])
                    .map(|t| normalize_relation_type(&t))
                    .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string()),
            })
        })
        .filter(|r| {
            seen_edges.insert((
                r.source_name.to_lowercase(),
                r.target_name.to_lowercase(),
                r.relation_type.clone(),
            ))
        })
        .collect();

    let metadata = root
        .get("metadata")
        .cloned()
        .and_then(|m| serde_json::from_value(m).ok())
        .unwrap_or_default();

    debug!(
        entities = entities.len(),
        relations = relations.len(),
        "Parsed extraction reply"
    );

    Extraction {
        entities,
        relations,
        metadata,
    }
}

fn degraded(reason: &str) -> Extraction {
    warn!(kind = %ErrorKind::ExtractDegraded, reason = %reason, "Unusable extraction reply");
    Extraction::default()
}

fn elements<'a>(root: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    root.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// First non-blank string among `keys`, trimmed
fn text_field(element: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| element.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `works for` -> `WORKS_FOR`
fn normalize_relation_type(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::ScriptedChat;

    #[test]
    fn test_parses_well_formed_reply() {
        let reply = r#"{
            "entities": [
                {"name": "John", "type": "PERSON", "description": "An engineer"},
                {"name": "Google", "type": "organization"}
            ],
            "relations": [
                {"source": "John", "target": "Google", "relation": "WORKS_FOR"}
            ],
            "metadata": {"topics": ["work"], "sentiment": "neutral", "language": "en"}
        }"#;

        let extraction = parse_extraction(reply);
        assert_eq!(extraction.entities.len(), 2);
        assert_eq!(extraction.entities[0].description, "An engineer");
        assert_eq!(extraction.entities[1].entity_type, "ORGANIZATION");
        assert_eq!(extraction.entities[1].description, "");
        assert_eq!(
            extraction.relations,
            vec![ExtractedRelation {
                source_name: "John".to_string(),
                target_name: "Google".to_string(),
                relation_type: "WORKS_FOR".to_string(),
            }]
        );
        assert_eq!(extraction.metadata.topics, vec!["work".to_string()]);
        assert_eq!(extraction.metadata.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_strips_markdown_fences() {
        let reply = "```json\n{\"entities\":[{\"name\":\"Paris\"}],\"relations\":[]}\n```";
        let extraction = parse_extraction(reply);
        assert_eq!(extraction.entities.len(), 1);
        assert_eq!(extraction.entities[0].entity_type, DEFAULT_ENTITY_TYPE);

        assert_eq!(strip_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_fenced_garbage_is_empty() {
        assert!(parse_extraction("``` not json ```").is_empty());
        assert!(parse_extraction("").is_empty());
        assert!(parse_extraction("{ broken").is_empty());
    }

    #[test]
    fn test_object_inside_prose() {
        let reply = "Sure! Here you go: {\"entities\":[{\"name\":\"Rust\"}]} Hope that helps.";
        assert_eq!(parse_extraction(reply).entities[0].name, "Rust");
    }

    #[test]
    fn test_malformed_elements_are_dropped() {
        let reply = r#"{
            "entities": [{"name": ""}, {"type": "PERSON"}, 42, {"name": "  Ada  "}],
            "relations": [
                {"source": "Ada", "target": ""},
                {"source": "Ada"},
                {"source_name": "Ada", "target_name": "Babbage"},
                {"source": "Ada", "target": "Babbage", "relation_type": "worked with"}
            ]
        }"#;

        let extraction = parse_extraction(reply);
        assert_eq!(extraction.entities.len(), 1);
        assert_eq!(extraction.entities[0].name, "Ada");
        assert_eq!(extraction.relations.len(), 2);
        assert_eq!(extraction.relations[0].relation_type, DEFAULT_RELATION_TYPE);
        assert_eq!(extraction.relations[1].relation_type, "WORKED_WITH");
    }

    #[test]
    fn test_repeated_names_and_edges_keep_first() {
        let reply = r#"{
            "entities": [
                {"name": "John", "type": "PERSON", "description": "first"},
                {"name": "Google", "type": "ORGANIZATION"},
                {"name": "john", "type": "OTHER", "description": "second"},
                {"name": " John ", "type": "PERSON"}
            ],
            "relations": [
                {"source": "John", "target": "Google", "relation": "works for"},
                {"source": "john", "target": "GOOGLE", "relation": "WORKS_FOR"},
                {"source": "John", "target": "Google", "relation": "FOUNDED"},
                {"source": "Google", "target": "John", "relation": "WORKS_FOR"}
            ]
        }"#;

        let extraction = parse_extraction(reply);
        let names: Vec<&str> = extraction.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["John", "Google"]);
        assert_eq!(extraction.entities[0].description, "first");

        let types: Vec<&str> = extraction
            .relations
            .iter()
            .map(|r| r.relation_type.as_str())
            .collect();
        assert_eq!(types, vec!["WORKS_FOR", "FOUNDED", "WORKS_FOR"]);
        assert_eq!(extraction.relations[0].source_name, "John");
        assert_eq!(extraction.relations[2].source_name, "Google");
    }

    #[test]
    fn test_missing_arrays_become_empty() {
        let extraction = parse_extraction(r#"{"entities": "nope"}"#);
        assert!(extraction.is_empty());
        assert_eq!(extraction.metadata, ExtractionMetadata::default());
    }

    #[test]
    fn test_prompt_embeds_text() {
        let prompt = build_prompt("John works at Google.");
        assert!(prompt.contains("TEXT:\nJohn works at Google."));
        assert!(prompt.contains("\"relations\""));
    }

    #[tokio::test]
    async fn test_extract_never_fails() {
        let failing = Extractor::new(Arc::new(ScriptedChat::failing(|| {
            Error::ProviderUnavailable("503".to_string())
        })));
        assert!(failing.extract("anything").await.is_empty());

        let chat = ScriptedChat::always(r#"{"entities":[{"name":"X"}],"relations":[]}"#);
        let extractor = Extractor::new(Arc::new(chat.clone()));
        assert_eq!(extractor.extract("X").await.entities.len(), 1);
        assert_eq!(chat.calls(), 1);
    }
}
