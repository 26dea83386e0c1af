//! In-memory ledger store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use treasury_core::{
    Community, ExecutionCommit, LedgerStore, Leader, Proposal, ProposalStatus, TransactionRecord,
    TreasuryError, TreasuryResult,
};

#[derive(Debug, Default)]
struct LedgerState {
    communities: HashMap<String, Community>,
    proposals: HashMap<String, Proposal>,
    transactions: Vec<TransactionRecord>,
}

/// Ledger store holding everything behind one `RwLock`.
///
/// Each trait method takes the lock once, so every method is atomic with
/// respect to every other.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn proposal_not_found(id: &str) -> TreasuryError {
    TreasuryError::NotFound(format!("proposal {}", id))
}

fn community_not_found(id: &str) -> TreasuryError {
    TreasuryError::NotFound(format!("community {}", id))
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_community(&self, community: Community) -> TreasuryResult<Community> {
        let mut state = self.state.write();
        if state.communities.contains_key(&community.id) {
            return Err(TreasuryError::Conflict(format!(
                "community {} already exists",
                community.id
            )));
        }
        state
            .communities
            .insert(community.id.clone(), community.clone());
        Ok(community)
    }

    async fn get_community(&self, id: &str) -> TreasuryResult<Option<Community>> {
        Ok(self.state.read().communities.get(id).cloned())
    }

    async fn list_communities(&self) -> TreasuryResult<Vec<Community>> {
        let mut communities: Vec<Community> =
            self.state.read().communities.values().cloned().collect();
        communities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(communities)
    }

    async fn add_member(&self, community_id: &str, address: &str) -> TreasuryResult<Community> {
        let mut state = self.state.write();
        let community = state
            .communities
            .get_mut(community_id)
            .ok_or_else(|| community_not_found(community_id))?;

        if community.is_member(address) {
            return Err(TreasuryError::Conflict(format!(
                "{} is already a member",
                address
            )));
        }
        community.members.push(address.to_string());
        Ok(community.clone())
    }

    async fn add_leader(&self, community_id: &str, leader: Leader) -> TreasuryResult<Community> {
        let mut state = self.state.write();
        let community = state
            .communities
            .get_mut(community_id)
            .ok_or_else(|| community_not_found(community_id))?;

        if community.is_leader(&leader.address) {
            return Err(TreasuryError::Conflict(format!(
                "{} is already a leader",
                leader.address
            )));
        }
        if !community.is_member(&leader.address) {
            community.members.push(leader.address.clone());
        }
        community.leaders.push(leader);
        Ok(community.clone())
    }

    async fn insert_proposal(&self, proposal: Proposal) -> TreasuryResult<Proposal> {
        let mut state = self.state.write();
        if !state.communities.contains_key(&proposal.community_id) {
            return Err(community_not_found(&proposal.community_id));
        }
        if state.proposals.contains_key(&proposal.id) {
            return Err(TreasuryError::Conflict(format!(
                "proposal {} already exists",
                proposal.id
            )));
        }
        state.proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(proposal)
    }

    async fn get_proposal(&self, id: &str) -> TreasuryResult<Option<Proposal>> {
        Ok(self.state.read().proposals.get(id).cloned())
    }

    async fn list_proposals(&self, community_id: &str) -> TreasuryResult<Vec<Proposal>> {
        let mut proposals: Vec<Proposal> = self
            .state
            .read()
            .proposals
            .values()
            .filter(|p| p.community_id == community_id)
            .cloned()
            .collect();
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }

    async fn append_approval(&self, proposal_id: &str, approver: &str) -> TreasuryResult<Proposal> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let proposal = state
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| proposal_not_found(proposal_id))?;

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

        let threshold = match proposal.required_approvals {
            Some(n) => n as usize,
            None => state
                .communities
                .get(&proposal.community_id)
                .map(Community::leader_count)
                .ok_or_else(|| community_not_found(&proposal.community_id))?,
        };

        proposal.approvals.push(approver.to_string());
        if proposal.approvals.len() >= threshold {
            proposal.status = ProposalStatus::Approved;
        }
        debug!(
            proposal_id = %proposal_id,
            approvals = proposal.approvals.len(),
            threshold,
            "Approval appended"
        );
        Ok(proposal.clone())
    }

    async fn compare_and_set_status(
        &self,
        proposal_id: &str,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> TreasuryResult<bool> {
        let mut state = self.state.write();
        let proposal = state
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| proposal_not_found(proposal_id))?;

        if proposal.status != expected {
            return Ok(false);
        }
        proposal.status = next;
        Ok(true)
    }

    async fn commit_execution(
        &self,
        commit: ExecutionCommit,
    ) -> TreasuryResult<(Proposal, TransactionRecord)> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let proposal = state
            .proposals
            .get_mut(&commit.proposal_id)
            .ok_or_else(|| proposal_not_found(&commit.proposal_id))?;
        if proposal.status != ProposalStatus::Approved {
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not approved",
                commit.proposal_id, proposal.status
            )));
        }

        let community = state
            .communities
            .get_mut(&proposal.community_id)
            .ok_or_else(|| community_not_found(&proposal.community_id))?;
        let remaining = community.balance.checked_sub(proposal.amount).ok_or(
            TreasuryError::InsufficientBalance {
                required: proposal.amount,
                available: community.balance,
            },
        )?;

        community.balance = remaining;
        proposal.status = ProposalStatus::Executed;
        proposal.executed_at = Some(commit.executed_at);
        proposal.executed_by = Some(commit.executed_by.clone());
        proposal.tx_hash = Some(commit.tx_hash.clone());

        let record = TransactionRecord {
            id: commit.transaction_id,
            proposal_id: proposal.id.clone(),
            community_id: proposal.community_id.clone(),
            amount: proposal.amount,
            recipient_address: proposal.recipient_address.clone(),
            executed_by: commit.executed_by,
            executed_at: commit.executed_at,
            tx_hash: commit.tx_hash,
            proposal_title: Some(proposal.title.clone()),
        };
        let proposal = proposal.clone();
        state.transactions.push(record.clone());

        Ok((proposal, record))
    }

    async fn list_transactions(
        &self,
        community_id: &str,
    ) -> TreasuryResult<Vec<TransactionRecord>> {
        let mut transactions: Vec<TransactionRecord> = self
            .state
            .read()
            .transactions
            .iter()
            .filter(|t| t.community_id == community_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        Ok(transactions)
    }
}
