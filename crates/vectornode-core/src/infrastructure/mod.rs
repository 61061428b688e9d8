//! Infrastructure layer
//!
//! SQLite-backed implementations of the domain seams:
//! - `memory`: the memory store and vector ranking
//! - `events`: the outbox change bus
//! - `setup`: accepted provider configurations

pub mod events;
pub mod memory;
pub mod setup;
pub mod time;
