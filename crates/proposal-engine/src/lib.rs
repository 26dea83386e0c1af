//! Proposal Engine
//!
//! The treasury state machine: proposals move from `pending` to `approved`
//! as leaders sign off, and from `approved` to `executed` once the chain
//! submitter confirms the payout. Also owns community and leader management.
//!
//! The chain submission is the only irreversible step. It runs on its own
//! task under a per-proposal lock, a bounded timeout and a per-treasury
//! circuit breaker. Nothing is written locally until a transaction hash comes
//! back, and a caller that goes away cannot separate the payout from its
//! ledger commit.

pub mod circuit_breaker;
pub mod community;
pub mod config;
pub mod engine;
pub mod locks;

pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitOpenError, CircuitState, CircuitStats, TreasuryCircuits,
};
pub use community::{CommunityDraft, CommunityRegistry};
pub use config::{EngineConfig, ThresholdPolicy};
pub use engine::{Execution, ProposalDetails, ProposalDraft, ProposalEngine};
pub use locks::{KeyedGuard, KeyedLocks};
