//! Transactions API handler

use crate::api::proposals::CommunityQuery;
use crate::api::{error_response, ApiError};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use treasury_core::TransactionRecord;

/// GET /api/v1/transactions?community_id= - newest execution first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommunityQuery>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    let community_id = query.require()?;
    let transactions = state
        .engine
        .list_transactions(&community_id)
        .await
        .map_err(error_response)?;
    Ok(Json(transactions))
}
