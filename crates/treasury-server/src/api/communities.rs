//! Community API handlers

use crate::api::{error_response, ok, ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use proposal_engine::CommunityDraft;
use serde::Deserialize;
use std::sync::Arc;
use treasury_core::{Community, Leader};

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub address: String,
}

/// POST /api/v1/communities
pub async fn create_community(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommunityDraft>,
) -> ApiResult {
    let community = state
        .registry
        .create_community(req)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "community": community })))
}

/// GET /api/v1/communities
pub async fn list_communities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Community>>, ApiError> {
    let communities = state
        .registry
        .list_communities()
        .await
        .map_err(error_response)?;
    Ok(Json(communities))
}

/// GET /api/v1/communities/:id
pub async fn get_community(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Community>, ApiError> {
    let community = state
        .registry
        .get_community(&id)
        .await
        .map_err(error_response)?;
    Ok(Json(community))
}

/// POST /api/v1/communities/:id/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult {
    let community = state
        .registry
        .add_member(&id, &req.address)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "community": community })))
}

/// POST /api/v1/communities/:id/leaders
pub async fn add_leader(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(leader): Json<Leader>,
) -> ApiResult {
    let community = state
        .registry
        .add_leader(&id, leader)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "community": community })))
}
