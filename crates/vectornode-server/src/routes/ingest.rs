//! `POST /api/ingest/document`

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;
use vectornode_core::domain::ingest::IngestRequest;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub kb_id: String,
    pub embedding_dim: usize,
    pub processing_ms: u64,
    pub embedding_ms: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/document", post(ingest_document))
}

async fn ingest_document(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(request) = payload?;
    info!(user_id = %request.user_id, role = %request.role, "Ingest request received");

    let receipt = state.ingest.ingest(request).await?;

    Ok(Json(IngestResponse {
        status: "SUCCESS",
        kb_id: receipt.kb_id,
        embedding_dim: receipt.embedding_dim,
        processing_ms: receipt.processing_ms,
        embedding_ms: receipt.embedding_ms,
    }))
}
