//! Memory domain module
//!
//! The four-tier data model and the store seam:
//!
//! - **KnowledgeBase**: one ingested utterance or document
//! - **Context**: an embedded chunk of a knowledge base entry
//! - **Entity**: a concept deduplicated by name, linked to contexts
//! - **Relation**: a directed typed edge with an occurrence counter

mod model;
mod repository;

pub use model::{
    Context, Entity, EntityLink, KnowledgeBase, Neighbor, NewContext, NewEntity,
    NewKnowledgeBase, Relation, Role, StoreStats,
};
pub use repository::MemoryStore;
