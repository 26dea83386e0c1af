//! Proposal lifecycle engine
//!
//! ```text
//!  pending ──(approvals reach threshold)──> approved ──(execute)──> executed
//!     │
//!     └──(reject)──> rejected
//! ```
//!
//! Every transition is checked here against store state and then applied as
//! one atomic store operation. Execution additionally holds a per-proposal
//! and a per-treasury lock across the chain submission, so at most one payout
//! per proposal is in flight and two payouts never race for the same balance.
//! The locked section runs on a spawned task: dropping the caller's future
//! does not abandon a payout between submission and commit.

use crate::circuit_breaker::{CircuitStats, TreasuryCircuits};
use crate::config::{EngineConfig, ThresholdPolicy};
use crate::locks::KeyedLocks;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use treasury_core::{
    ChainSubmitter, Community, ExecutionCommit, LedgerStore, Lovelace, NewProposal, Proposal,
    ProposalStatus, SubmissionRequest, TransactionRecord, TreasuryError, TreasuryResult,
};
use uuid::Uuid;

/// Input for a new proposal, amount in ADA as entered by the proposer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub community_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub amount: f64,
    pub recipient_address: String,
    #[serde(default)]
    pub zk_proof_url: Option<String>,
}

/// A proposal together with its current threshold
#[derive(Debug, Clone, Serialize)]
pub struct ProposalDetails {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub approval_threshold: usize,
    pub can_execute: bool,
}

/// Result of a successful execute
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub proposal: Proposal,
    pub transaction: TransactionRecord,
}

pub struct ProposalEngine {
    store: Arc<dyn LedgerStore>,
    submitter: Arc<dyn ChainSubmitter>,
    config: EngineConfig,
    proposal_locks: KeyedLocks,
    treasury_locks: KeyedLocks,
    circuits: Arc<TreasuryCircuits>,
}

/// Everything the detached execute task needs
struct Payout {
    store: Arc<dyn LedgerStore>,
    submitter: Arc<dyn ChainSubmitter>,
    circuits: Arc<TreasuryCircuits>,
    submit_timeout: Duration,
}

fn non_empty(value: &str, field: &str) -> TreasuryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TreasuryError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ProposalEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        submitter: Arc<dyn ChainSubmitter>,
        config: EngineConfig,
    ) -> Self {
        let circuits = Arc::new(TreasuryCircuits::new(config.circuit.clone()));
        Self {
            store,
            submitter,
            config,
            proposal_locks: KeyedLocks::new(),
            treasury_locks: KeyedLocks::new(),
            circuits,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    async fn require_proposal(&self, id: &str) -> TreasuryResult<Proposal> {
        self.store
            .get_proposal(id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("proposal {}", id)))
    }

    async fn require_community(&self, id: &str) -> TreasuryResult<Community> {
        self.store
            .get_community(id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("community {}", id)))
    }

    /// A snapshot taken at submission wins over the live leader count
    fn threshold_for(proposal: &Proposal, community: &Community) -> usize {
        proposal
            .required_approvals
            .map(|n| n as usize)
            .unwrap_or_else(|| community.leader_count())
    }

    fn require_leader(community: &Community, caller: &str, action: &str) -> TreasuryResult<()> {
        if !community.is_leader(caller) {
            return Err(TreasuryError::Forbidden(format!(
                "{} is not a leader of community {} and cannot {}",
                caller, community.id, action
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Create a pending proposal
    pub async fn submit_proposal(&self, draft: ProposalDraft) -> TreasuryResult<Proposal> {
        let title = non_empty(&draft.title, "title")?;
        let recipient_address = non_empty(&draft.recipient_address, "recipient address")?;
        let amount = Lovelace::positive_from_ada(draft.amount)?;
        let community = self.require_community(draft.community_id.trim()).await?;

        let required_approvals = match self.config.threshold_policy {
            ThresholdPolicy::Floating => None,
            ThresholdPolicy::FixedAtCreation => Some(community.leader_count() as u32),
        };

        let new = NewProposal {
            community_id: community.id,
            title,
            description: draft.description.trim().to_string(),
            category: optional(draft.category),
            amount,
            recipient_address,
            zk_proof_url: optional(draft.zk_proof_url),
            required_approvals,
        };

        let proposal = new.into_pending(Uuid::new_v4().to_string(), Utc::now());
        let proposal = self.store.insert_proposal(proposal).await?;
        info!(
            proposal_id = %proposal.id,
            community_id = %proposal.community_id,
            amount = %proposal.amount,
            "Proposal submitted"
        );
        Ok(proposal)
    }

    /// Record a leader's approval, advancing to `approved` at the threshold
    pub async fn approve_proposal(
        &self,
        proposal_id: &str,
        approver: &str,
    ) -> TreasuryResult<Proposal> {
        let approver = approver.trim();
        let proposal = self.require_proposal(proposal_id).await?;
        let community = self.require_community(&proposal.community_id).await?;

        Self::require_leader(&community, approver, "approve")?;
        if proposal.status != ProposalStatus::Pending {
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not pending",
                proposal_id, proposal.status
            )));
        }
        if proposal.has_approved(approver) {
            return Err(TreasuryError::Conflict(format!(
                "{} has already approved proposal {}",
                approver, proposal_id
            )));
        }

        // The store resolves the threshold inside the append
        let proposal = self.store.append_approval(proposal_id, approver).await?;

        info!(
            proposal_id = %proposal_id,
            approver = %approver,
            approvals = proposal.approval_count(),
            status = %proposal.status,
            "Proposal approved by leader"
        );
        Ok(proposal)
    }

    /// Reject a pending proposal
    pub async fn reject_proposal(&self, proposal_id: &str, caller: &str) -> TreasuryResult<Proposal> {
        let caller = caller.trim();
        let proposal = self.require_proposal(proposal_id).await?;
        let community = self.require_community(&proposal.community_id).await?;

        Self::require_leader(&community, caller, "reject")?;

        let swapped = self
            .store
            .compare_and_set_status(proposal_id, ProposalStatus::Pending, ProposalStatus::Rejected)
            .await?;
        if !swapped {
            let current = self.require_proposal(proposal_id).await?;
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not pending",
                proposal_id, current.status
            )));
        }

        info!(proposal_id = %proposal_id, rejected_by = %caller, "Proposal rejected");
        self.require_proposal(proposal_id).await
    }

    /// Pay out an approved proposal through the chain submitter
    pub async fn execute_proposal(
        &self,
        proposal_id: &str,
        executor: &str,
    ) -> TreasuryResult<Execution> {
        let executor = non_empty(executor, "executor address")?;
        let proposal = self.require_proposal(proposal_id).await?;
        let community = self.require_community(&proposal.community_id).await?;
        Self::require_leader(&community, &executor, "execute")?;

        let proposal_guard = self.proposal_locks.acquire(proposal_id).await;
        let treasury_guard = self.treasury_locks.acquire(&community.id).await;

        let payout = Payout {
            store: self.store.clone(),
            submitter: self.submitter.clone(),
            circuits: self.circuits.clone(),
            submit_timeout: self.config.submit_timeout,
        };
        let proposal_id = proposal_id.to_string();
        let task = tokio::spawn(async move {
            let _locks = (proposal_guard, treasury_guard);
            payout.run(&proposal_id, executor).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(TreasuryError::Storage(format!(
                "execute task did not complete: {}",
                e
            ))),
        }
    }

    /// Number of proposals with an execute holding or waiting on its lock
    pub fn executions_in_flight(&self) -> usize {
        self.proposal_locks.len()
    }
}

impl Payout {
    async fn run(&self, proposal_id: &str, executor: String) -> TreasuryResult<Execution> {
        // Re-read under the locks: an earlier holder may have executed it
        let proposal = self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("proposal {}", proposal_id)))?;
        let community = self
            .store
            .get_community(&proposal.community_id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("community {}", proposal.community_id)))?;

        if proposal.status != ProposalStatus::Approved {
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not approved",
                proposal_id, proposal.status
            )));
        }
        let threshold = ProposalEngine::threshold_for(&proposal, &community);
        if proposal.approval_count() < threshold {
            return Err(TreasuryError::Conflict(format!(
                "proposal {} has {} of {} required approvals",
                proposal_id,
                proposal.approval_count(),
                threshold
            )));
        }
        if proposal.amount > community.balance {
            return Err(TreasuryError::InsufficientBalance {
                required: proposal.amount,
                available: community.balance,
            });
        }

        let request = SubmissionRequest {
            request_id: proposal.id.clone(),
            treasury_address: community.treasury_address.clone(),
            credential: community.signing_credential.clone(),
            recipient: proposal.recipient_address.clone(),
            amount: proposal.amount,
        };
        let tx_hash = self.submit(&request).await?;

        let commit = ExecutionCommit {
            proposal_id: proposal.id.clone(),
            transaction_id: Uuid::new_v4().to_string(),
            executed_by: executor.clone(),
            executed_at: Utc::now(),
            tx_hash: tx_hash.clone(),
        };

        let (proposal, transaction) = match self.store.commit_execution(commit).await {
            Ok(committed) => committed,
            Err(e) => {
                // The payout is on chain; only the local record is missing
                error!(
                    proposal_id = %proposal_id,
                    tx_hash = %tx_hash,
                    error = %e,
                    "Payout submitted but ledger commit failed"
                );
                return Err(e);
            }
        };

        info!(
            proposal_id = %proposal_id,
            executed_by = %executor,
            amount = %proposal.amount,
            tx_hash = %tx_hash,
            "Proposal executed"
        );

        Ok(Execution {
            proposal,
            transaction,
        })
    }

    async fn submit(&self, request: &SubmissionRequest) -> TreasuryResult<String> {
        let treasury = request.treasury_address.as_str();

        if let Err(open) = self.circuits.check(treasury) {
            warn!(proposal_id = %request.request_id, "{}", open);
            return Err(TreasuryError::ChainSubmissionFailed(open.to_string()));
        }

        debug!(
            proposal_id = %request.request_id,
            recipient = %request.recipient,
            amount = %request.amount,
            "Submitting payout"
        );

        let outcome =
            tokio::time::timeout(self.submit_timeout, self.submitter.submit(request)).await;

        let cause = match outcome {
            Ok(Ok(tx_hash)) if !tx_hash.trim().is_empty() => {
                self.circuits.record_success(treasury);
                return Ok(tx_hash);
            }
            Ok(Ok(_)) => "signer returned an empty transaction hash".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "chain submission timed out after {}s",
                self.submit_timeout.as_secs_f64()
            ),
        };

        self.circuits.record_failure(treasury);
        warn!(proposal_id = %request.request_id, cause = %cause, "Payout submission failed");
        Err(TreasuryError::ChainSubmissionFailed(cause))
    }
}

impl ProposalEngine {
    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_proposal(&self, proposal_id: &str) -> TreasuryResult<ProposalDetails> {
        let proposal = self.require_proposal(proposal_id).await?;
        let community = self.require_community(&proposal.community_id).await?;
        let approval_threshold = Self::threshold_for(&proposal, &community);
        let can_execute = proposal.status == ProposalStatus::Approved
            && proposal.approval_count() >= approval_threshold;

        Ok(ProposalDetails {
            proposal,
            approval_threshold,
            can_execute,
        })
    }

    /// Approvals a proposal needs under the configured policy
    pub async fn approval_threshold(&self, proposal_id: &str) -> TreasuryResult<usize> {
        let proposal = self.require_proposal(proposal_id).await?;
        let community = self.require_community(&proposal.community_id).await?;
        Ok(Self::threshold_for(&proposal, &community))
    }

    pub async fn list_proposals(&self, community_id: &str) -> TreasuryResult<Vec<Proposal>> {
        self.require_community(community_id).await?;
        self.store.list_proposals(community_id).await
    }

    pub async fn list_transactions(
        &self,
        community_id: &str,
    ) -> TreasuryResult<Vec<TransactionRecord>> {
        let community_id = non_empty(community_id, "community id")?;
        self.store.list_transactions(&community_id).await
    }

    pub fn circuit_stats(&self) -> Vec<CircuitStats> {
        self.circuits.stats()
    }
}
