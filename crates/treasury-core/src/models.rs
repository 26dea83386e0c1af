//! Treasury entities
//!
//! These are the strict shapes every store hands back. Rows are validated
//! once when they leave the store; nothing downstream re-checks field
//! presence or casing.

use crate::amount::Lovelace;
use crate::chain::SigningCredential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COMMUNITIES
// ============================================================================

/// A leader of a community treasury
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leader {
    /// Chain address
    pub address: String,
    /// Optional display name
    pub name: Option<String>,
}

impl Leader {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }
}

/// A group owning a shared treasury, governed by its leaders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub name: String,
    pub description: String,
    pub treasury_address: String,
    /// Never leaves the process through the API
    #[serde(skip_serializing, default)]
    pub signing_credential: SigningCredential,
    /// Decremented only by successful executions
    pub balance: Lovelace,
    pub leaders: Vec<Leader>,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Community {
    pub fn is_leader(&self, address: &str) -> bool {
        self.leaders.iter().any(|l| l.address == address)
    }

    pub fn is_member(&self, address: &str) -> bool {
        self.members.iter().any(|m| m == address)
    }

    pub fn leader_count(&self) -> usize {
        self.leaders.len()
    }
}

// ============================================================================
// PROPOSALS
// ============================================================================

/// Proposal lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Executed => "executed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProposalStatus::Pending),
            "approved" => Ok(ProposalStatus::Approved),
            "rejected" => Ok(ProposalStatus::Rejected),
            "executed" => Ok(ProposalStatus::Executed),
            other => Err(format!("unknown proposal status: {}", other)),
        }
    }
}

/// A request to pay from a community treasury to a recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub community_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub amount: Lovelace,
    pub recipient_address: String,
    /// Supporting evidence link; opaque, never verified
    pub zk_proof_url: Option<String>,
    pub status: ProposalStatus,
    /// Approver addresses in approval order, no duplicates
    pub approvals: Vec<String>,
    /// Leader count captured at submission under the fixed threshold policy
    pub required_approvals: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<String>,
    pub tx_hash: Option<String>,
}

impl Proposal {
    pub fn has_approved(&self, address: &str) -> bool {
        self.approvals.iter().any(|a| a == address)
    }

    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }
}

/// Validated input for inserting a proposal
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub community_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub amount: Lovelace,
    pub recipient_address: String,
    pub zk_proof_url: Option<String>,
    pub required_approvals: Option<u32>,
}

impl NewProposal {
    /// A fresh `pending` proposal with no approvals
    pub fn into_pending(self, id: String, created_at: DateTime<Utc>) -> Proposal {
        Proposal {
            id,
            community_id: self.community_id,
            title: self.title,
            description: self.description,
            category: self.category,
            amount: self.amount,
            recipient_address: self.recipient_address,
            zk_proof_url: self.zk_proof_url,
            status: ProposalStatus::Pending,
            approvals: Vec::new(),
            required_approvals: self.required_approvals,
            created_at,
            executed_at: None,
            executed_by: None,
            tx_hash: None,
        }
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Immutable record of a completed on-chain payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub proposal_id: String,
    pub community_id: String,
    pub amount: Lovelace,
    pub recipient_address: String,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub tx_hash: String,
    /// Title of the originating proposal, joined on listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposal_title: Option<String>,
}
