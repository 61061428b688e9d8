//! Change bus implementations

mod outbox;

pub use outbox::{BusSettings, SqliteEventBus};
