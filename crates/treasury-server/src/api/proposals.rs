//! Proposal API handlers
//!
//! Approve, reject and execute act on behalf of a caller resolved from the
//! wallet session header or the body `address`.

use crate::api::{error_json, error_response, ok, ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use proposal_engine::{ProposalDetails, ProposalDraft};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use treasury_core::Proposal;

#[derive(Debug, Deserialize)]
pub struct CommunityQuery {
    #[serde(alias = "communityId")]
    pub community_id: Option<String>,
}

impl CommunityQuery {
    pub fn require(self) -> Result<String, ApiError> {
        self.community_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| error_json(StatusCode::BAD_REQUEST, "community_id is required"))
    }
}

/// Body of approve/reject/execute
#[derive(Debug, Default, Deserialize)]
pub struct IntentRequest {
    #[serde(default, alias = "executedBy", alias = "executed_by")]
    pub address: Option<String>,
}

fn caller(
    state: &AppState,
    headers: &HeaderMap,
    body: Option<Json<IntentRequest>>,
) -> Result<String, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    state.resolve_caller(headers, body.address.as_deref())
}

/// POST /api/v1/proposals
pub async fn create_proposal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProposalDraft>,
) -> ApiResult {
    let proposal = state
        .engine
        .submit_proposal(req)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "proposal": proposal })))
}

/// GET /api/v1/proposals?community_id=
pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommunityQuery>,
) -> Result<Json<Vec<Proposal>>, ApiError> {
    let community_id = query.require()?;
    let proposals = state
        .engine
        .list_proposals(&community_id)
        .await
        .map_err(error_response)?;
    Ok(Json(proposals))
}

/// GET /api/v1/proposals/:id
pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProposalDetails>, ApiError> {
    let details = state.engine.get_proposal(&id).await.map_err(error_response)?;
    Ok(Json(details))
}

/// POST /api/v1/proposals/:id/approve
pub async fn approve_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<IntentRequest>>,
) -> ApiResult {
    let approver = caller(&state, &headers, body)?;
    let proposal = state
        .engine
        .approve_proposal(&id, &approver)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "proposal": proposal })))
}

/// POST /api/v1/proposals/:id/reject
pub async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<IntentRequest>>,
) -> ApiResult {
    let caller = caller(&state, &headers, body)?;
    let proposal = state
        .engine
        .reject_proposal(&id, &caller)
        .await
        .map_err(error_response)?;
    Ok(ok(serde_json::json!({ "proposal": proposal })))
}

/// POST /api/v1/proposals/:id/execute
pub async fn execute_proposal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<IntentRequest>>,
) -> ApiResult {
    let executor = caller(&state, &headers, body)?;
    info!("Execute requested for proposal {} by {}", id, executor);

    let execution = state
        .engine
        .execute_proposal(&id, &executor)
        .await
        .map_err(error_response)?;

    Ok(ok(serde_json::json!({
        "proposal": execution.proposal,
        "transaction": execution.transaction,
        "tx_hash": execution.transaction.tx_hash,
    })))
}
