//! Domain layer
//!
//! - `memory`: knowledge base entries, contexts, entities, relations and the store trait
//! - `events`: change-bus events and the bus trait
//! - `ingest`: front-door, chunking, extraction, pipeline handlers, worker pool
//! - `query`: retrieval operations
//! - `setup`: runtime provider configuration

pub mod events;
pub mod ingest;
pub mod memory;
pub mod query;
pub mod setup;
