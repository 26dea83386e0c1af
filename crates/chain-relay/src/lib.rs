//! Signing relay client
//!
//! [`RelaySubmitter`] implements [`ChainSubmitter`] by handing the payout to
//! an external signing relay over HTTP. The relay builds, signs and submits
//! the transaction and answers with its hash.
//!
//! ```text
//! POST {base_url}/v1/payouts
//! Authorization: Bearer {token}        (optional)
//! {"request_id": "...", "signing_key": "...", "recipient": "addr...", "lovelace": 200000000}
//!
//! 200 {"tx_hash": "..."}
//! ```
//!
//! `request_id` is the proposal id, so a relay that dedupes on it makes a
//! retried execute safe.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use treasury_core::{ChainSubmitter, SubmissionError, SubmissionRequest};

const PAYOUTS_PATH: &str = "/v1/payouts";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay root, e.g. `http://127.0.0.1:8090`
    pub base_url: String,
    /// Bearer token sent with every payout
    pub token: Option<String>,
    /// HTTP-level timeout; the engine applies its own bound on top
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            token: None,
            timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Serialize)]
struct PayoutRequest<'a> {
    request_id: &'a str,
    signing_key: &'a str,
    recipient: &'a str,
    lovelace: u64,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    tx_hash: String,
}

pub struct RelaySubmitter {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl RelaySubmitter {
    pub fn new(config: RelayConfig) -> Result<Self, SubmissionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SubmissionError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), PAYOUTS_PATH),
            token: config.token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn status_error(status: StatusCode, body: String) -> SubmissionError {
    let cause = format!("relay error {}: {}", status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SubmissionError::Unavailable(cause)
    } else {
        SubmissionError::Rejected(cause)
    }
}

#[async_trait]
impl ChainSubmitter for RelaySubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SubmissionError> {
        let body = PayoutRequest {
            request_id: &request.request_id,
            signing_key: request.credential.expose(),
            recipient: &request.recipient,
            lovelace: request.amount.as_u64(),
        };

        debug!(
            request_id = %request.request_id,
            endpoint = %self.endpoint,
            "Sending payout to relay"
        );

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SubmissionError::Unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let data: PayoutResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::InvalidResponse(e.to_string()))?;

        let tx_hash = data.tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(SubmissionError::InvalidResponse(
                "relay returned an empty tx_hash".to_string(),
            ));
        }
        Ok(tx_hash.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use treasury_core::{Lovelace, SigningCredential};

    async fn spawn_relay(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            request_id: "prop-1".to_string(),
            treasury_address: "addr_test1qtreasury".to_string(),
            credential: SigningCredential::new("ed25519_sk1secret"),
            recipient: "addr_test1qrecipient".to_string(),
            amount: Lovelace(200_000_000),
        }
    }

    fn submitter(base_url: String, token: Option<&str>) -> RelaySubmitter {
        RelaySubmitter::new(RelayConfig {
            base_url,
            token: token.map(String::from),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_joins_path() {
        let s = submitter("http://relay.local/".to_string(), None);
        assert_eq!(s.endpoint(), "http://relay.local/v1/payouts");
    }

    #[tokio::test]
    async fn test_successful_payout_sends_contract_fields() {
        let router = Router::new().route(
            "/v1/payouts",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer relay-token")
                );
                assert_eq!(body["request_id"], "prop-1");
                assert_eq!(body["signing_key"], "ed25519_sk1secret");
                assert_eq!(body["recipient"], "addr_test1qrecipient");
                assert_eq!(body["lovelace"], 200_000_000u64);
                Json(json!({"tx_hash": "txid123"}))
            }),
        );
        let base = spawn_relay(router).await;

        let tx_hash = submitter(base, Some("relay-token"))
            .submit(&request())
            .await
            .unwrap();
        assert_eq!(tx_hash, "txid123");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let router = Router::new()
            .route(
                "/bad/v1/payouts",
                post(|| async { (StatusCode::BAD_REQUEST, "insufficient utxos") }),
            )
            .route(
                "/down/v1/payouts",
                post(|| async { (StatusCode::BAD_GATEWAY, "node offline") }),
            )
            .route(
                "/empty/v1/payouts",
                post(|| async { Json(json!({"tx_hash": ""})) }),
            )
            .route(
                "/garbage/v1/payouts",
                post(|| async { "not json" }),
            );
        let base = spawn_relay(router).await;

        let err = submitter(format!("{}/bad", base), None)
            .submit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected(ref m) if m.contains("insufficient utxos")));

        let err = submitter(format!("{}/down", base), None)
            .submit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Unavailable(ref m) if m.contains("502")));

        let err = submitter(format!("{}/empty", base), None)
            .submit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidResponse(_)));

        let err = submitter(format!("{}/garbage", base), None)
            .submit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_relay() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = submitter(format!("http://{}", addr), None)
            .submit(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Unavailable(_)));
    }
}
