//! Wallet session handlers

use crate::api::{error_json, ok, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    pub address: Option<String>,
}

/// POST /api/v1/sessions
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<OpenSessionRequest>>,
) -> ApiResult {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let (token, address) = state
        .open_session(req.address.as_deref())
        .map_err(|e| error_json(StatusCode::BAD_REQUEST, e))?;

    debug!("Wallet session opened (connected: {})", address.is_some());
    Ok(ok(serde_json::json!({
        "token": token,
        "address": address,
    })))
}

/// GET /api/v1/sessions/:token
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult {
    let session = state
        .sessions
        .get(&token)
        .ok_or_else(|| error_json(StatusCode::NOT_FOUND, "session not found"))?;
    let address = session.address();

    Ok(ok(serde_json::json!({
        "token": token,
        "connected": address.is_some(),
        "address": address,
    })))
}

/// DELETE /api/v1/sessions/:token
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> ApiResult {
    if !state.close_session(&token) {
        return Err(error_json(StatusCode::NOT_FOUND, "session not found"));
    }
    Ok(ok(serde_json::json!({})))
}
