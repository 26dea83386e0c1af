//! Treasury Node
//!
//! Serves the community treasury REST API. Payouts are signed and submitted
//! by an external signing relay.

use anyhow::{Context, Result};
use chain_relay::{RelayConfig, RelaySubmitter};
use clap::Parser;
use ledger_store::{MemoryLedgerStore, SqliteLedgerStore};
use proposal_engine::{EngineConfig, ProposalEngine, ThresholdPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use treasury_core::LedgerStore;
use treasury_server::{router, AppState};

// ==================== CLI ====================

#[derive(Parser, Debug)]
#[command(name = "treasury-node")]
#[command(about = "Community treasury: proposals, leader approvals and on-chain payouts")]
struct Args {
    /// HTTP listen address
    #[arg(long, env = "TREASURY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// SQLite database file (a `sqlite://` prefix is accepted)
    #[arg(long, env = "TREASURY_DATABASE_URL", default_value = "./data/treasury.db")]
    database_url: String,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long, env = "TREASURY_EPHEMERAL")]
    ephemeral: bool,

    // Signing relay
    #[arg(long, env = "SIGNING_RELAY_URL", default_value = "http://127.0.0.1:8090")]
    relay_url: String,

    #[arg(long, env = "SIGNING_RELAY_TOKEN")]
    relay_token: Option<String>,

    /// Upper bound on one payout submission
    #[arg(long, env = "SUBMIT_TIMEOUT_SECS", default_value = "60")]
    submit_timeout_secs: u64,

    /// `floating` (current leader count) or `fixed_at_creation`
    #[arg(long, env = "THRESHOLD_POLICY", default_value = "floating")]
    threshold_policy: ThresholdPolicy,
}

impl Args {
    fn database_path(&self) -> PathBuf {
        let raw = self.database_url.trim();
        PathBuf::from(raw.strip_prefix("sqlite://").unwrap_or(raw))
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            submit_timeout: Duration::from_secs(self.submit_timeout_secs.max(1)),
            threshold_policy: self.threshold_policy,
            ..Default::default()
        }
    }

    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            base_url: self.relay_url.clone(),
            token: self.relay_token.clone(),
            ..Default::default()
        }
    }
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,treasury_node=debug".into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting treasury node");

    // Storage
    let store: Arc<dyn LedgerStore> = if args.ephemeral {
        warn!("Ephemeral mode: ledger is in memory only");
        Arc::new(MemoryLedgerStore::new())
    } else {
        let path = args.database_path();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
        }
        Arc::new(SqliteLedgerStore::open(&path).await?)
    };

    // Signing relay
    let relay = RelaySubmitter::new(args.relay_config())?;
    info!("Signing relay: {}", relay.endpoint());
    if args.relay_token.is_none() {
        warn!("Signing relay: no token configured");
    }

    let config = args.engine_config();
    info!(
        "Threshold policy: {}, submit timeout: {}s",
        config.threshold_policy,
        config.submit_timeout.as_secs()
    );

    let engine = Arc::new(ProposalEngine::new(store, Arc::new(relay), config));
    let state = Arc::new(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("Treasury API listening on http://{}. Ctrl+C to stop.", args.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
            }
        })
        .await?;

    info!("Stopped.");
    Ok(())
}
