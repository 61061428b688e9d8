//! `/api/query/graph`: traversal over the relation graph

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use vectornode_core::domain::memory::Relation;
use vectornode_core::domain::query::QueryResponse;

use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_TOP_RELATIONS: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/outgoing/{entity_id}", get(outgoing))
        .route("/incoming/{entity_id}", get(incoming))
        .route("/2hop/{entity_id}", get(two_hop))
        .route("/top", get(top_relations))
        .route("/source/{entity_id}", get(relations_by_source))
        .route("/target/{entity_id}", get(relations_by_target))
        .route("/type/{relation_type}", get(relations_by_type))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    limit: Option<usize>,
}

async fn outgoing(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.outgoing(&entity_id).await?))
}

async fn incoming(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.incoming(&entity_id).await?))
}

async fn two_hop(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<QueryResponse>> {
    Ok(Json(state.query.two_hop(&entity_id).await?))
}

async fn top_relations(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_TOP_RELATIONS);
    Ok(Json(state.query.top_relations(limit).await?))
}

async fn relations_by_source(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<Vec<Relation>>> {
    Ok(Json(state.query.relations_by_source(&entity_id).await?))
}

async fn relations_by_target(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
) -> ApiResult<Json<Vec<Relation>>> {
    Ok(Json(state.query.relations_by_target(&entity_id).await?))
}

async fn relations_by_type(
    State(state): State<AppState>,
    Path(relation_type): Path<String>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Relation>>> {
    let Query(params) = params?;
    Ok(Json(
        state
            .query
            .relations_by_type(&relation_type, params.limit)
            .await?,
    ))
}
