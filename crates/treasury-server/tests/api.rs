//! Router tests driven through `tower::ServiceExt::oneshot`

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ledger_store::MemoryLedgerStore;
use proposal_engine::{EngineConfig, ProposalEngine};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;
use treasury_core::{ChainSubmitter, SubmissionError, SubmissionRequest};
use treasury_server::{router, AppState, SESSION_HEADER};

const L1: &str = "addr_test1qz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3jcu5d8ps7zex2k2xt3uqxgjqnnj83ws8lhrn648jjxtwq2ytjqp";
const L2: &str = "addr_test1qleader2";
const R: &str = "addr_test1qrecipient";

/// Fails the first `failures` payouts, then returns `txid123`
#[derive(Default)]
struct StubSubmitter {
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl ChainSubmitter for StubSubmitter {
    async fn submit(&self, _request: &SubmissionRequest) -> Result<String, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SubmissionError::Rejected("relay error 400: bad utxo".to_string()));
        }
        Ok("txid123".to_string())
    }
}

fn app(submitter: Arc<StubSubmitter>) -> Router {
    let engine = ProposalEngine::new(
        Arc::new(MemoryLedgerStore::new()),
        submitter,
        EngineConfig::default(),
    );
    router(Arc::new(AppState::new(Arc::new(engine))))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    session: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        builder = builder.header(SESSION_HEADER, token);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_community(app: &Router, balance: f64) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/communities",
        Some(json!({
            "name": "Chess Club",
            "description": "Weekly tournaments",
            "treasury_address": "addr_test1qtreasury",
            "signing_credential": "ed25519_sk1secret",
            "initial_balance": balance,
            "leaders": [{"address": L1, "name": "Ana"}, {"address": L2}]
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["community"]["id"].as_str().unwrap().to_string()
}

async fn create_proposal(app: &Router, community_id: &str, amount: f64) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/proposals",
        Some(json!({
            "community_id": community_id,
            "title": "Projector",
            "description": "For club nights",
            "category": "equipment",
            "amount": amount,
            "recipient_address": R
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["proposal"]["id"].as_str().unwrap().to_string()
}

async fn approve(app: &Router, proposal_id: &str, address: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        &format!("/api/v1/proposals/{}/approve", proposal_id),
        Some(json!({ "address": address })),
        None,
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let app = app(Arc::new(StubSubmitter::default()));
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["threshold_policy"], "floating");
    assert_eq!(body["executions_in_flight"], 0);
}

#[tokio::test]
async fn test_community_endpoints() {
    let app = app(Arc::new(StubSubmitter::default()));
    let id = create_community(&app, 1000.0).await;

    let (status, body) = send(&app, "GET", &format!("/api/v1/communities/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 1_000_000_000u64);
    assert!(body.get("signing_credential").is_none());

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/communities/{}/members", id),
        Some(json!({ "address": "addr_test1qmember" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["community"]["members"].as_array().unwrap().len(), 3);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/communities/{}/leaders", id),
        Some(json!({ "address": L2 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, "GET", "/api/v1/communities", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/v1/communities/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let submitter = Arc::new(StubSubmitter::default());
    let app = app(submitter.clone());
    let community_id = create_community(&app, 1000.0).await;
    let proposal_id = create_proposal(&app, &community_id, 200.0).await;

    let (status, body) = approve(&app, &proposal_id, L1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proposal"]["status"], "pending");

    let (status, body) = approve(&app, &proposal_id, L1).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, body) = approve(&app, &proposal_id, L2).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proposal"]["status"], "approved");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/proposals/{}", proposal_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approval_threshold"], 2);
    assert_eq!(body["can_execute"], true);

    // The dashboard sends the executor as `executedBy`
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/proposals/{}/execute", proposal_id),
        Some(json!({ "executedBy": L1 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["tx_hash"], "txid123");
    assert_eq!(body["proposal"]["status"], "executed");
    assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/transactions?communityId={}", community_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["tx_hash"], "txid123");
    assert_eq!(body[0]["proposal_title"], "Projector");

    let (_, body) = send(&app, "GET", &format!("/api/v1/communities/{}", community_id), None, None).await;
    assert_eq!(body["balance"], 800_000_000u64);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/proposals?community_id={}", community_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_statuses() {
    let submitter = Arc::new(StubSubmitter {
        failures: AtomicUsize::new(1),
        ..Default::default()
    });
    let app = app(submitter);
    let community_id = create_community(&app, 100.0).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/proposals",
        Some(json!({
            "community_id": community_id,
            "title": "Nothing",
            "amount": 0,
            "recipient_address": R
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = approve(&app, "missing", L1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let big = create_proposal(&app, &community_id, 500.0).await;
    let (status, _) = approve(&app, &big, R).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    approve(&app, &big, L1).await;
    approve(&app, &big, L2).await;
    let execute = format!("/api/v1/proposals/{}/execute", big);
    let (status, body) = send(&app, "POST", &execute, Some(json!({ "address": L1 })), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "insufficient_balance");

    let small = create_proposal(&app, &community_id, 50.0).await;
    approve(&app, &small, L1).await;
    approve(&app, &small, L2).await;
    let execute = format!("/api/v1/proposals/{}/execute", small);
    let (status, body) = send(&app, "POST", &execute, Some(json!({ "address": L1 })), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("bad utxo"));

    let (status, _) = send(&app, "POST", &execute, Some(json!({ "address": L1 })), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", &execute, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/v1/transactions", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_wallet_session_identifies_caller() {
    let app = app(Arc::new(StubSubmitter::default()));
    let community_id = create_community(&app, 1000.0).await;
    let proposal_id = create_proposal(&app, &community_id, 10.0).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/sessions",
        Some(json!({ "address": "not-a-cardano-address" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/sessions",
        Some(json!({ "address": L1 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/api/v1/sessions/{}", token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["address"], L1);

    // The session wins over whatever the body claims
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/proposals/{}/approve", proposal_id),
        Some(json!({ "address": R })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["proposal"]["approvals"][0], L1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{}", token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{}", token), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/v1/proposals/{}/reject", proposal_id),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
