//! REST handlers
//!
//! Errors render as `{"success": false, "error": "..."}` with a status code
//! picked from the error kind.

pub mod communities;
pub mod proposals;
pub mod sessions;
pub mod transactions;

use axum::{http::StatusCode, Json};
use serde_json::Value;
use tracing::{error, warn};
use treasury_core::TreasuryError;

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult = Result<Json<Value>, ApiError>;

pub fn status_for(err: &TreasuryError) -> StatusCode {
    match err {
        TreasuryError::NotFound(_) => StatusCode::NOT_FOUND,
        TreasuryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TreasuryError::Forbidden(_) => StatusCode::FORBIDDEN,
        TreasuryError::Conflict(_) => StatusCode::CONFLICT,
        TreasuryError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TreasuryError::ChainSubmissionFailed(_) => StatusCode::BAD_GATEWAY,
        TreasuryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_json(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": message.into(),
        })),
    )
}

pub fn error_response(err: TreasuryError) -> ApiError {
    let status = status_for(&err);
    match &err {
        TreasuryError::Storage(_) => error!(kind = err.kind(), "Request failed: {}", err),
        TreasuryError::ChainSubmissionFailed(_) => warn!(kind = err.kind(), "Request failed: {}", err),
        _ => {}
    }
    let (status, Json(mut body)) = error_json(status, err.to_string());
    body["kind"] = Value::from(err.kind());
    (status, Json(body))
}

pub fn ok(fields: Value) -> Json<Value> {
    let mut body = serde_json::json!({ "success": true });
    if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), fields) {
        target.extend(extra);
    }
    Json(body)
}
