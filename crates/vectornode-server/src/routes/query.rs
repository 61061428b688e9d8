//! `/api/query`: context, entity and history retrieval

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use vectornode_core::domain::memory::Entity;
use vectornode_core::domain::query::{QueryResponse, SearchRequest};

use crate::error::ApiResult;
use crate::state::AppState;

use super::graph;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/contexts", post(search_contexts))
        .route("/contexts/kb/{kb_id}", get(contexts_by_kb))
        .route("/contexts/recent", get(recent_contexts).post(search_recent_contexts))
        .route("/contexts/range", get(contexts_by_range))
        .route("/contexts/siblings/{context_id}", get(siblings))
        .route("/contexts/{context_id}/entities", get(entities_for_context))
        .route("/entities", post(search_entities))
        .route("/entities/name/{name}", get(entity_by_name))
        .route("/entities/name-ignore-case/{name}", get(entity_by_name_ignore_case))
        .route("/entities/id/{name}", get(entity_id_by_name))
        .route("/entities/disambiguate", post(disambiguate))
        .route("/entities/merge", post(merge_entities))
        .route("/entities/{entity_id}/contexts", get(contexts_for_entity))
        .route("/history", post(search_history))
        .route("/history/recent", get(recent_kbs))
        .route("/history/since", get(kbs_since))
        .route("/history/user/{user_id}", get(history_by_user).delete(delete_user_data))
        .route("/hybrid", post(hybrid_search))
        .nest("/graph", graph::routes())
}

// ========== Parameters ==========

#[derive(Debug, Deserialize)]
pub struct DaysParams {
    #[serde(default = "default_days")]
    days: u32,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HoursParams {
    #[serde(default = "default_hours")]
    hours: u32,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    #[serde(alias = "startDate")]
    start: String,
    #[serde(alias = "endDate")]
    end: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SinceParams {
    since: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DisambiguateParams {
    #[serde(alias = "entityName")]
    name: String,
    #[serde(alias = "contextText")]
    context: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeParams {
    #[serde(alias = "sourceEntityId")]
    source: String,
    #[serde(alias = "targetEntityId")]
    target: String,
}

fn default_days() -> u32 {
    7
}

fn default_hours() -> u32 {
    24
}

#[derive(Debug, Serialize)]
pub struct EntityIdResponse {
    id: String,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    status: &'static str,
    source: String,
    target: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    status: &'static str,
    user_id: String,
    deleted: u64,
}

// ========== Contexts ==========

async fn search_contexts(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.query.search_contexts(&request).await?))
}

async fn contexts_by_kb(
    State(state): State<AppState>,
    Path(kb_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.contexts_by_kb(&kb_id).await?))
}

async fn recent_contexts(
    State(state): State<AppState>,
    params: Result<Query<DaysParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    Ok(Json(state.query.recent_contexts(params.days, params.limit).await?))
}

async fn search_recent_contexts(
    State(state): State<AppState>,
    params: Result<Query<DaysParams>, QueryRejection>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    let Json(request) = payload?;
    Ok(Json(
        state.query.search_recent_contexts(&request, params.days).await?,
    ))
}

async fn contexts_by_range(
    State(state): State<AppState>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    Ok(Json(
        state
            .query
            .contexts_by_range(&params.start, &params.end, params.limit)
            .await?,
    ))
}

async fn siblings(
    State(state): State<AppState>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.siblings(&context_id).await?))
}

async fn entities_for_context(
    State(state): State<AppState>,
    Path(context_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.entities_for_context(&context_id).await?))
}

// ========== Entities ==========

async fn search_entities(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.query.search_entities(&request).await?))
}

async fn entity_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Entity>> {
    Ok(Json(state.query.entity_by_name(&name, false).await?))
}

async fn entity_by_name_ignore_case(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Entity>> {
    Ok(Json(state.query.entity_by_name(&name, true).await?))
}

async fn entity_id_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<EntityIdResponse>> {
    let entity = state.query.entity_by_name(&name, false).await?;
    Ok(Json(EntityIdResponse { id: entity.id }))
}

async fn disambiguate(
    State(state): State<AppState>,
    params: Result<Query<DisambiguateParams>, QueryRejection>,
) -> ApiResult<Json<Entity>> {
    let Query(params) = params?;
    Ok(Json(
        state.query.disambiguate(&params.name, &params.context).await?,
    ))
}

async fn merge_entities(
    State(state): State<AppState>,
    params: Result<Query<MergeParams>, QueryRejection>,
) -> ApiResult<Json<MergeResponse>> {
    let Query(params) = params?;
    state.query.merge_entities(&params.source, &params.target).await?;
    Ok(Json(MergeResponse {
        status: "SUCCESS",
        source: params.source,
        target: params.target,
    }))
}

async fn contexts_for_entity(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.contexts_for_entity(&entity_id).await?))
}

// ========== History ==========

async fn search_history(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.query.search_history(&request).await?))
}

async fn recent_kbs(
    State(state): State<AppState>,
    params: Result<Query<HoursParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    Ok(Json(state.query.recent_kbs(params.hours, params.limit).await?))
}

async fn kbs_since(
    State(state): State<AppState>,
    params: Result<Query<SinceParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    Ok(Json(state.query.kbs_since(&params.since, params.limit).await?))
}

async fn history_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.history_by_user(&user_id).await?))
}

async fn delete_user_data(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.query.delete_user_data(&user_id).await?;
    Ok(Json(DeleteResponse {
        status: "SUCCESS",
        user_id,
        deleted,
    }))
}

async fn hybrid_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = payload?;
    Ok(Json(state.query.hybrid_search(&request).await?))
}
