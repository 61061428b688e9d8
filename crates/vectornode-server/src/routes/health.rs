use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;
use vectornode_core::domain::events::EventBus;
use vectornode_core::domain::memory::MemoryStore;

use crate::state::AppState;

/// Liveness plus a snapshot of store, bus and pipeline counters.
///
/// Always answers 200; a failing database shows up as `"database": "DOWN"`.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.database.health_check().await {
        Ok(()) => "UP",
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            "DOWN"
        }
    };

    let store = state.store.stats().await.ok();
    let bus = state.bus.counts().await.ok();

    Json(json!({
        "status": "UP",
        "timestamp": Utc::now().to_rfc3339(),
        "database": database,
        "model": state.registry.descriptor(),
        "store": store,
        "bus": bus,
        "pipeline": state.pipeline.stats().snapshot(),
    }))
}
