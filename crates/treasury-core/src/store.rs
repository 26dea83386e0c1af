//! Ledger store contract
//!
//! Every mutation that the lifecycle engine relies on for correctness is a
//! single atomic store operation: approval append with threshold advance,
//! status compare-and-set, and the execution commit.

use crate::error::TreasuryResult;
use crate::models::{Community, Leader, Proposal, ProposalStatus, TransactionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Everything written when a proposal becomes executed
#[derive(Debug, Clone)]
pub struct ExecutionCommit {
    pub proposal_id: String,
    pub transaction_id: String,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub tx_hash: String,
}

/// Persistent record of communities, proposals, approvals and transactions
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ---- communities ----

    async fn insert_community(&self, community: Community) -> TreasuryResult<Community>;

    async fn get_community(&self, id: &str) -> TreasuryResult<Option<Community>>;

    async fn list_communities(&self) -> TreasuryResult<Vec<Community>>;

    /// Add a member address. `Conflict` if already a member.
    async fn add_member(&self, community_id: &str, address: &str) -> TreasuryResult<Community>;

    /// Add a leader (and make them a member). `Conflict` if already a leader.
    async fn add_leader(&self, community_id: &str, leader: Leader) -> TreasuryResult<Community>;

    // ---- proposals ----

    async fn insert_proposal(&self, proposal: Proposal) -> TreasuryResult<Proposal>;

    async fn get_proposal(&self, id: &str) -> TreasuryResult<Option<Proposal>>;

    /// Proposals of a community, newest first
    async fn list_proposals(&self, community_id: &str) -> TreasuryResult<Vec<Proposal>>;

    /// Append an approver to a pending proposal.
    ///
    /// Atomically: fails with `Conflict` unless the proposal is pending and
    /// the approver is new, appends, and moves the proposal to `approved`
    /// once the approval count reaches the threshold. The threshold is the
    /// proposal's `required_approvals` snapshot if set, otherwise the
    /// community's leader count read in the same operation.
    async fn append_approval(&self, proposal_id: &str, approver: &str)
        -> TreasuryResult<Proposal>;

    /// Set `status = next` only if it currently equals `expected`.
    /// Returns whether the swap happened.
    async fn compare_and_set_status(
        &self,
        proposal_id: &str,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> TreasuryResult<bool>;

    /// Record a confirmed payout.
    ///
    /// Atomically: swaps the proposal `approved -> executed` (`Conflict`
    /// otherwise), decrements the community balance (`InsufficientBalance`
    /// if it would go negative) and inserts the transaction record.
    async fn commit_execution(
        &self,
        commit: ExecutionCommit,
    ) -> TreasuryResult<(Proposal, TransactionRecord)>;

    // ---- transactions ----

    /// Transactions of a community, most recent execution first
    async fn list_transactions(&self, community_id: &str)
        -> TreasuryResult<Vec<TransactionRecord>>;
}
