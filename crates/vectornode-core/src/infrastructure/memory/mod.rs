//! SQLite-backed memory store

mod repository;
pub mod vector;

pub use repository::SqliteMemoryStore;
