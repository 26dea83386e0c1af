//! Community and membership management

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use treasury_core::{
    Community, LedgerStore, Leader, Lovelace, SigningCredential, TreasuryError, TreasuryResult,
};
use uuid::Uuid;

/// Input for a new community, balance in ADA
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub treasury_address: String,
    pub signing_credential: String,
    #[serde(default)]
    pub initial_balance: f64,
    pub leaders: Vec<Leader>,
}

pub struct CommunityRegistry {
    store: Arc<dyn LedgerStore>,
}

fn required(value: &str, field: &str) -> TreasuryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TreasuryError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn clean_leader(leader: Leader) -> TreasuryResult<Leader> {
    Ok(Leader {
        address: required(&leader.address, "leader address")?,
        name: leader
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
    })
}

impl CommunityRegistry {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_community(&self, draft: CommunityDraft) -> TreasuryResult<Community> {
        let name = required(&draft.name, "name")?;
        let treasury_address = required(&draft.treasury_address, "treasury address")?;
        let signing_credential = SigningCredential::new(draft.signing_credential.trim());
        if signing_credential.is_empty() {
            return Err(TreasuryError::InvalidInput(
                "signing credential must not be empty".to_string(),
            ));
        }
        let balance = Lovelace::from_ada(draft.initial_balance)?;

        // First occurrence of an address wins
        let mut leaders: Vec<Leader> = Vec::with_capacity(draft.leaders.len());
        for leader in draft.leaders {
            let leader = clean_leader(leader)?;
            if !leaders.iter().any(|l| l.address == leader.address) {
                leaders.push(leader);
            }
        }
        if leaders.is_empty() {
            return Err(TreasuryError::InvalidInput(
                "a community needs at least one leader".to_string(),
            ));
        }

        let community = Community {
            id: Uuid::new_v4().to_string(),
            name,
            description: draft.description.trim().to_string(),
            treasury_address,
            signing_credential,
            balance,
            members: leaders.iter().map(|l| l.address.clone()).collect(),
            leaders,
            created_at: Utc::now(),
        };

        let community = self.store.insert_community(community).await?;
        info!(
            community_id = %community.id,
            leaders = community.leader_count(),
            balance = %community.balance,
            "Community created"
        );
        Ok(community)
    }

    pub async fn add_member(&self, community_id: &str, address: &str) -> TreasuryResult<Community> {
        let address = required(address, "member address")?;
        let community = self.store.add_member(community_id, &address).await?;
        info!(community_id = %community_id, member = %address, "Member added");
        Ok(community)
    }

    /// Add a leader. Under the floating threshold this raises the approval
    /// bar of every pending proposal in the community.
    pub async fn add_leader(&self, community_id: &str, leader: Leader) -> TreasuryResult<Community> {
        let leader = clean_leader(leader)?;
        let address = leader.address.clone();
        let community = self.store.add_leader(community_id, leader).await?;
        info!(
            community_id = %community_id,
            leader = %address,
            leaders = community.leader_count(),
            "Leader added"
        );
        Ok(community)
    }

    pub async fn get_community(&self, community_id: &str) -> TreasuryResult<Community> {
        self.store
            .get_community(community_id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("community {}", community_id)))
    }

    pub async fn list_communities(&self) -> TreasuryResult<Vec<Community>> {
        self.store.list_communities().await
    }
}
