//! Treasury Server
//!
//! axum REST API over the proposal engine. Handlers translate JSON intents
//! into engine calls and map `TreasuryError` kinds onto HTTP status codes.

pub mod api;
pub mod state;

pub use state::{AppState, SESSION_HEADER};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "threshold_policy": state.engine.config().threshold_policy,
        "payout_circuits": state.engine.circuit_stats(),
        "executions_in_flight": state.engine.executions_in_flight(),
        "sessions": state.sessions.len(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route(
            "/communities",
            post(api::communities::create_community).get(api::communities::list_communities),
        )
        .route("/communities/:id", get(api::communities::get_community))
        .route("/communities/:id/members", post(api::communities::add_member))
        .route("/communities/:id/leaders", post(api::communities::add_leader))
        .route(
            "/proposals",
            post(api::proposals::create_proposal).get(api::proposals::list_proposals),
        )
        .route("/proposals/:id", get(api::proposals::get_proposal))
        .route("/proposals/:id/approve", post(api::proposals::approve_proposal))
        .route("/proposals/:id/reject", post(api::proposals::reject_proposal))
        .route("/proposals/:id/execute", post(api::proposals::execute_proposal))
        .route("/transactions", get(api::transactions::list_transactions))
        .route("/sessions", post(api::sessions::open_session))
        .route(
            "/sessions/:token",
            get(api::sessions::get_session).delete(api::sessions::close_session),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .with_state(state)
}
