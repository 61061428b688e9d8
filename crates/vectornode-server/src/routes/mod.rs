//! HTTP routes, one module per resource

pub mod graph;
pub mod health;
pub mod ingest;
pub mod query;
pub mod setup;
