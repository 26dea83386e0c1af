//! Error taxonomy shared by the store, the engine and the API

use crate::amount::Lovelace;

/// Errors returned by every treasury intent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreasuryError {
    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range request data
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Caller lacks the required role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Entity is not in the state the transition requires
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient balance: requested {required}, available {available}")]
    InsufficientBalance {
        required: Lovelace,
        available: Lovelace,
    },

    /// External chain submission failed; the proposal stays retryable
    #[error("chain submission failed: {0}")]
    ChainSubmissionFailed(String),

    /// Storage backend failure or a persisted row that failed validation
    #[error("storage error: {0}")]
    Storage(String),
}

pub type TreasuryResult<T> = Result<T, TreasuryError>;

impl TreasuryError {
    /// Short machine-readable kind, used in API error bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            TreasuryError::NotFound(_) => "not_found",
            TreasuryError::InvalidInput(_) => "invalid_input",
            TreasuryError::Forbidden(_) => "forbidden",
            TreasuryError::Conflict(_) => "conflict",
            TreasuryError::InsufficientBalance { .. } => "insufficient_balance",
            TreasuryError::ChainSubmissionFailed(_) => "chain_submission_failed",
            TreasuryError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TreasuryError::Conflict("already approved".into());
        assert_eq!(err.to_string(), "conflict: already approved");

        let err = TreasuryError::InsufficientBalance {
            required: Lovelace(2_000_000),
            available: Lovelace(1_000_000),
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: requested 2 ADA, available 1 ADA"
        );
    }

    #[test]
    fn test_kind() {
        assert_eq!(TreasuryError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            TreasuryError::ChainSubmissionFailed("timeout".into()).kind(),
            "chain_submission_failed"
        );
    }
}
