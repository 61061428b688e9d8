//! Query domain module
//!
//! Semantic, temporal, structural and graph retrieval over the memory store.
//! Every listing operation answers with a `QueryResponse`.

mod engine;
mod result;

pub use engine::{
    DEFAULT_LIMIT, K_MAX, LINKED_ENTITY_DECAY, QueryEngine, SearchRequest, parse_instant,
};
pub use result::{QueryResponse, ResultKind, SearchResult};
