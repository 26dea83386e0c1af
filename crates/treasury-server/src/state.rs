//! Application state

use crate::api::{error_json, ApiError};
use axum::http::{HeaderMap, StatusCode};
use dashmap::DashMap;
use proposal_engine::{CommunityRegistry, ProposalEngine};
use std::sync::Arc;
use treasury_core::WalletSession;
use uuid::Uuid;

/// Header carrying a wallet session token
pub const SESSION_HEADER: &str = "x-wallet-session";

pub struct AppState {
    pub engine: Arc<ProposalEngine>,
    pub registry: CommunityRegistry,
    /// Connected wallets keyed by opaque session token
    pub sessions: DashMap<String, WalletSession>,
}

impl AppState {
    pub fn new(engine: Arc<ProposalEngine>) -> Self {
        let registry = CommunityRegistry::new(engine.store().clone());
        Self {
            engine,
            registry,
            sessions: DashMap::new(),
        }
    }

    /// Open a session, optionally connecting `address` straight away
    pub fn open_session(&self, address: Option<&str>) -> Result<(String, Option<String>), String> {
        let session = WalletSession::new();
        if let Some(address) = address {
            session.connect(address)?;
        }
        let connected = session.address();
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), session);
        Ok((token, connected))
    }

    pub fn close_session(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                session.disconnect();
                true
            }
            None => false,
        }
    }

    /// Resolve who is acting: the session's wallet when the header is
    /// present, otherwise the address given in the request body
    pub fn resolve_caller(
        &self,
        headers: &HeaderMap,
        body_address: Option<&str>,
    ) -> Result<String, ApiError> {
        if let Some(token) = headers.get(SESSION_HEADER) {
            let token = token
                .to_str()
                .map_err(|_| error_json(StatusCode::BAD_REQUEST, "malformed session header"))?;
            let session = self
                .sessions
                .get(token)
                .ok_or_else(|| error_json(StatusCode::FORBIDDEN, "unknown wallet session"))?;
            return session
                .address()
                .ok_or_else(|| error_json(StatusCode::FORBIDDEN, "no wallet connected"));
        }

        body_address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                error_json(
                    StatusCode::BAD_REQUEST,
                    "caller address is required (body `address` or session header)",
                )
            })
    }
}
