//! Chain submission seam
//!
//! Building, signing and submitting a payout is the job of an external
//! signer. The engine only knows this contract: hand over a credential, a
//! recipient and an amount, get back a transaction hash or a cause.

use crate::amount::Lovelace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque credential the signer uses to spend from a treasury
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningCredential(String);

impl SigningCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningCredential(<redacted>)")
    }
}

/// A single payout to submit on-chain
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Stable across retries of the same proposal so the signer can dedupe
    pub request_id: String,
    pub treasury_address: String,
    pub credential: SigningCredential,
    pub recipient: String,
    pub amount: Lovelace,
}

/// Failure reported by a chain submitter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("signer rejected payout: {0}")]
    Rejected(String),
    #[error("signer unreachable: {0}")]
    Unavailable(String),
    #[error("malformed signer response: {0}")]
    InvalidResponse(String),
}

/// Turns an approved payout into an on-chain transaction
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    /// Submit the payout and return the chain transaction hash.
    ///
    /// Not assumed idempotent: a failure may still have reached the chain
    /// unless the signer dedupes on `request_id`.
    async fn submit(&self, request: &SubmissionRequest) -> Result<String, SubmissionError>;
}
