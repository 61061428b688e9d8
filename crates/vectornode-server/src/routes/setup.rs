//! `/api/setup`: check and install a model provider at runtime

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use vectornode_core::domain::setup::{SetupRecord, SetupRequest, SetupResponse};
use vectornode_core::llm::ModelDescriptor;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ActiveSetup {
    pub serving: ModelDescriptor,
    pub record: Option<SetupRecord>,
}

pub async fn configure(
    State(state): State<AppState>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> ApiResult<Json<SetupResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.setup.configure(request).await?))
}

pub async fn active_setup(State(state): State<AppState>) -> ApiResult<Json<ActiveSetup>> {
    Ok(Json(ActiveSetup {
        serving: state.registry.descriptor(),
        record: state.setup.active().await?,
    }))
}
