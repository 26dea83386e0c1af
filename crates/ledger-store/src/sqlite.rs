//! SQLite ledger store
//!
//! # Features
//!
//! - WAL mode and a bounded connection pool
//! - Embedded schema migration run on open
//! - Approvals keyed by `(proposal_id, approver)` so duplicates are refused
//!   by the database itself
//! - Every atomic contract operation is one SQL transaction whose first
//!   statement is a write, so concurrent writers queue on the database lock
//!   instead of racing a read-then-write upgrade
//!
//! Rows are validated once on the way out (status strings, negative amounts,
//! timestamps); anything malformed surfaces as `TreasuryError::Storage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use treasury_core::{
    Community, ExecutionCommit, LedgerStore, Leader, Lovelace, Proposal, ProposalStatus,
    SigningCredential, TransactionRecord, TreasuryError, TreasuryResult,
};

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS communities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    treasury_address TEXT NOT NULL,
    signing_credential TEXT NOT NULL,
    balance INTEGER NOT NULL CHECK (balance >= 0),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS community_leaders (
    community_id TEXT NOT NULL REFERENCES communities(id),
    address TEXT NOT NULL,
    name TEXT,
    PRIMARY KEY (community_id, address)
);

CREATE TABLE IF NOT EXISTS community_members (
    community_id TEXT NOT NULL REFERENCES communities(id),
    address TEXT NOT NULL,
    PRIMARY KEY (community_id, address)
);

CREATE TABLE IF NOT EXISTS proposals (
    id TEXT PRIMARY KEY,
    community_id TEXT NOT NULL REFERENCES communities(id),
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    category TEXT,
    amount INTEGER NOT NULL CHECK (amount > 0),
    recipient_address TEXT NOT NULL,
    zk_proof_url TEXT,
    status TEXT NOT NULL,
    required_approvals INTEGER,
    created_at INTEGER NOT NULL,
    executed_at INTEGER,
    executed_by TEXT,
    tx_hash TEXT
);

CREATE INDEX IF NOT EXISTS idx_proposals_community ON proposals(community_id, created_at);

CREATE TABLE IF NOT EXISTS proposal_approvals (
    proposal_id TEXT NOT NULL REFERENCES proposals(id),
    approver TEXT NOT NULL,
    approved_at INTEGER NOT NULL,
    PRIMARY KEY (proposal_id, approver)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    proposal_id TEXT NOT NULL UNIQUE REFERENCES proposals(id),
    community_id TEXT NOT NULL REFERENCES communities(id),
    amount INTEGER NOT NULL,
    recipient_address TEXT NOT NULL,
    executed_by TEXT NOT NULL,
    executed_at INTEGER NOT NULL,
    tx_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_community ON transactions(community_id, executed_at);
"#;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct CommunityRow {
    id: String,
    name: String,
    description: String,
    treasury_address: String,
    signing_credential: String,
    balance: i64,
    created_at: i64,
}

#[derive(Debug, FromRow)]
struct LeaderRow {
    address: String,
    name: Option<String>,
}

#[derive(Debug, FromRow)]
struct ProposalRow {
    id: String,
    community_id: String,
    title: String,
    description: String,
    category: Option<String>,
    amount: i64,
    recipient_address: String,
    zk_proof_url: Option<String>,
    status: String,
    required_approvals: Option<i64>,
    created_at: i64,
    executed_at: Option<i64>,
    executed_by: Option<String>,
    tx_hash: Option<String>,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    proposal_id: String,
    community_id: String,
    amount: i64,
    recipient_address: String,
    executed_by: String,
    executed_at: i64,
    tx_hash: String,
    proposal_title: Option<String>,
}

fn db_err(e: sqlx::Error) -> TreasuryError {
    TreasuryError::Storage(e.to_string())
}

/// Map constraint violations onto the contract's error kinds
fn write_err(e: sqlx::Error, conflict: impl FnOnce() -> String, missing: impl FnOnce() -> String) -> TreasuryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return TreasuryError::Conflict(conflict());
        }
        if db.is_foreign_key_violation() {
            return TreasuryError::NotFound(missing());
        }
    }
    db_err(e)
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64, field: &str) -> TreasuryResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| TreasuryError::Storage(format!("invalid {} timestamp: {}", field, ms)))
}

fn to_db_amount(amount: Lovelace) -> TreasuryResult<i64> {
    i64::try_from(amount.as_u64())
        .map_err(|_| TreasuryError::InvalidInput(format!("amount {} is out of range", amount)))
}

fn from_db_amount(value: i64, field: &str) -> TreasuryResult<Lovelace> {
    u64::try_from(value)
        .map(Lovelace)
        .map_err(|_| TreasuryError::Storage(format!("negative {}: {}", field, value)))
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = TreasuryError;

    fn try_from(row: ProposalRow) -> TreasuryResult<Self> {
        let status = ProposalStatus::from_str(&row.status).map_err(TreasuryError::Storage)?;
        let required_approvals = row
            .required_approvals
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    TreasuryError::Storage(format!("invalid required_approvals: {}", n))
                })
            })
            .transpose()?;
        let executed_at = row
            .executed_at
            .map(|ms| from_millis(ms, "executed_at"))
            .transpose()?;

        Ok(Proposal {
            id: row.id,
            community_id: row.community_id,
            title: row.title,
            description: row.description,
            category: row.category,
            amount: from_db_amount(row.amount, "amount")?,
            recipient_address: row.recipient_address,
            zk_proof_url: row.zk_proof_url,
            status,
            approvals: Vec::new(),
            required_approvals,
            created_at: from_millis(row.created_at, "created_at")?,
            executed_at,
            executed_by: row.executed_by,
            tx_hash: row.tx_hash,
        })
    }
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = TreasuryError;

    fn try_from(row: TransactionRow) -> TreasuryResult<Self> {
        Ok(TransactionRecord {
            id: row.id,
            proposal_id: row.proposal_id,
            community_id: row.community_id,
            amount: from_db_amount(row.amount, "amount")?,
            recipient_address: row.recipient_address,
            executed_by: row.executed_by,
            executed_at: from_millis(row.executed_at, "executed_at")?,
            tx_hash: row.tx_hash,
            proposal_title: row.proposal_title,
        })
    }
}

// ============================================================================
// Loaders (shared by pool reads and in-transaction reads)
// ============================================================================

async fn load_community(conn: &mut SqliteConnection, id: &str) -> TreasuryResult<Option<Community>> {
    let row = sqlx::query_as::<_, CommunityRow>("SELECT * FROM communities WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    let Some(row) = row else {
        return Ok(None);
    };

    let leaders = sqlx::query_as::<_, LeaderRow>(
        "SELECT address, name FROM community_leaders WHERE community_id = ? ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let members = sqlx::query_scalar::<_, String>(
        "SELECT address FROM community_members WHERE community_id = ? ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(Some(Community {
        id: row.id,
        name: row.name,
        description: row.description,
        treasury_address: row.treasury_address,
        signing_credential: SigningCredential::new(row.signing_credential),
        balance: from_db_amount(row.balance, "balance")?,
        leaders: leaders
            .into_iter()
            .map(|l| Leader {
                address: l.address,
                name: l.name,
            })
            .collect(),
        members,
        created_at: from_millis(row.created_at, "created_at")?,
    }))
}

async fn load_approvals(conn: &mut SqliteConnection, proposal_id: &str) -> TreasuryResult<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT approver FROM proposal_approvals WHERE proposal_id = ? ORDER BY rowid",
    )
    .bind(proposal_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)
}

async fn load_proposal(conn: &mut SqliteConnection, id: &str) -> TreasuryResult<Option<Proposal>> {
    let row = sqlx::query_as::<_, ProposalRow>("SELECT * FROM proposals WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut proposal = Proposal::try_from(row)?;
    proposal.approvals = load_approvals(conn, id).await?;
    Ok(Some(proposal))
}

async fn require_proposal(conn: &mut SqliteConnection, id: &str) -> TreasuryResult<Proposal> {
    load_proposal(conn, id)
        .await?
        .ok_or_else(|| TreasuryError::NotFound(format!("proposal {}", id)))
}

// ============================================================================
// SqliteLedgerStore
// ============================================================================

/// Ledger store backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open or create a database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> TreasuryResult<Self> {
        let path = path.as_ref();
        info!("Opening SQLite ledger at: {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| TreasuryError::Storage(format!("failed to open SQLite: {}", e)))?;

        Self::from_pool(pool).await
    }

    /// Open a private in-memory database (tests, ephemeral nodes)
    pub async fn open_in_memory() -> TreasuryResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err)?
            .foreign_keys(true);

        // A second connection would see a different empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| TreasuryError::Storage(format!("failed to open SQLite: {}", e)))?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> TreasuryResult<Self> {
        debug!("Running ledger migrations...");
        sqlx::raw_sql(MIGRATION_V1)
            .execute(&pool)
            .await
            .map_err(|e| TreasuryError::Storage(format!("migration failed: {}", e)))?;
        debug!("Ledger migrations completed");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn conn(&self) -> TreasuryResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool.acquire().await.map_err(db_err)
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn insert_community(&self, community: Community) -> TreasuryResult<Community> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO communities
                (id, name, description, treasury_address, signing_credential, balance, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&community.id)
        .bind(&community.name)
        .bind(&community.description)
        .bind(&community.treasury_address)
        .bind(community.signing_credential.expose())
        .bind(to_db_amount(community.balance)?)
        .bind(to_millis(community.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_err(
                e,
                || format!("community {} already exists", community.id),
                || format!("community {}", community.id),
            )
        })?;

        for leader in &community.leaders {
            sqlx::query("INSERT INTO community_leaders (community_id, address, name) VALUES (?, ?, ?)")
                .bind(&community.id)
                .bind(&leader.address)
                .bind(&leader.name)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for member in &community.members {
            sqlx::query("INSERT OR IGNORE INTO community_members (community_id, address) VALUES (?, ?)")
                .bind(&community.id)
                .bind(member)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(community)
    }

    async fn get_community(&self, id: &str) -> TreasuryResult<Option<Community>> {
        let mut conn = self.conn().await?;
        load_community(&mut conn, id).await
    }

    async fn list_communities(&self) -> TreasuryResult<Vec<Community>> {
        let mut conn = self.conn().await?;
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM communities ORDER BY created_at DESC",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        let mut communities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(community) = load_community(&mut conn, &id).await? {
                communities.push(community);
            }
        }
        Ok(communities)
    }

    async fn add_member(&self, community_id: &str, address: &str) -> TreasuryResult<Community> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("INSERT INTO community_members (community_id, address) VALUES (?, ?)")
            .bind(community_id)
            .bind(address)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                write_err(
                    e,
                    || format!("{} is already a member", address),
                    || format!("community {}", community_id),
                )
            })?;

        let community = load_community(&mut tx, community_id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("community {}", community_id)))?;
        tx.commit().await.map_err(db_err)?;
        Ok(community)
    }

    async fn add_leader(&self, community_id: &str, leader: Leader) -> TreasuryResult<Community> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("INSERT INTO community_leaders (community_id, address, name) VALUES (?, ?, ?)")
            .bind(community_id)
            .bind(&leader.address)
            .bind(&leader.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                write_err(
                    e,
                    || format!("{} is already a leader", leader.address),
                    || format!("community {}", community_id),
                )
            })?;

        sqlx::query("INSERT OR IGNORE INTO community_members (community_id, address) VALUES (?, ?)")
            .bind(community_id)
            .bind(&leader.address)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let community = load_community(&mut tx, community_id)
            .await?
            .ok_or_else(|| TreasuryError::NotFound(format!("community {}", community_id)))?;
        tx.commit().await.map_err(db_err)?;
        Ok(community)
    }

    async fn insert_proposal(&self, proposal: Proposal) -> TreasuryResult<Proposal> {
        let mut conn = self.conn().await?;

        sqlx::query(
            r#"
            INSERT INTO proposals
                (id, community_id, title, description, category, amount, recipient_address,
                 zk_proof_url, status, required_approvals, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&proposal.id)
        .bind(&proposal.community_id)
        .bind(&proposal.title)
        .bind(&proposal.description)
        .bind(&proposal.category)
        .bind(to_db_amount(proposal.amount)?)
        .bind(&proposal.recipient_address)
        .bind(&proposal.zk_proof_url)
        .bind(proposal.status.as_str())
        .bind(proposal.required_approvals.map(i64::from))
        .bind(to_millis(proposal.created_at))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            write_err(
                e,
                || format!("proposal {} already exists", proposal.id),
                || format!("community {}", proposal.community_id),
            )
        })?;

        Ok(proposal)
    }

    async fn get_proposal(&self, id: &str) -> TreasuryResult<Option<Proposal>> {
        let mut conn = self.conn().await?;
        load_proposal(&mut conn, id).await
    }

    async fn list_proposals(&self, community_id: &str) -> TreasuryResult<Vec<Proposal>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, ProposalRow>(
            "SELECT * FROM proposals WHERE community_id = ? ORDER BY created_at DESC",
        )
        .bind(community_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        let mut proposals = Vec::with_capacity(rows.len());
        for row in rows {
            let mut proposal = Proposal::try_from(row)?;
            proposal.approvals = load_approvals(&mut conn, &proposal.id).await?;
            proposals.push(proposal);
        }
        Ok(proposals)
    }

    async fn append_approval(&self, proposal_id: &str, approver: &str) -> TreasuryResult<Proposal> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO proposal_approvals (proposal_id, approver, approved_at)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM proposals WHERE id = ? AND status = 'pending')
            "#,
        )
        .bind(proposal_id)
        .bind(approver)
        .bind(to_millis(Utc::now()))
        .bind(proposal_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_err(
                e,
                || format!("{} has already approved proposal {}", approver, proposal_id),
                || format!("proposal {}", proposal_id),
            )
        })?
        .rows_affected();

        if inserted == 0 {
            let proposal = require_proposal(&mut tx, proposal_id).await?;
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not pending",
                proposal_id, proposal.status
            )));
        }

        sqlx::query(
            r#"
            UPDATE proposals SET status = 'approved'
            WHERE id = ? AND status = 'pending'
              AND (SELECT COUNT(*) FROM proposal_approvals WHERE proposal_id = proposals.id)
                  >= COALESCE(
                      required_approvals,
                      (SELECT COUNT(*) FROM community_leaders
                       WHERE community_id = proposals.community_id)
                  )
            "#,
        )
        .bind(proposal_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let proposal = require_proposal(&mut tx, proposal_id).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(
            proposal_id = %proposal_id,
            approvals = proposal.approvals.len(),
            status = %proposal.status,
            "Approval appended"
        );
        Ok(proposal)
    }

    async fn compare_and_set_status(
        &self,
        proposal_id: &str,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> TreasuryResult<bool> {
        let mut conn = self.conn().await?;
        let updated = sqlx::query("UPDATE proposals SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(proposal_id)
            .bind(expected.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_err)?
            .rows_affected();

        if updated == 0 {
            require_proposal(&mut conn, proposal_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn commit_execution(
        &self,
        commit: ExecutionCommit,
    ) -> TreasuryResult<(Proposal, TransactionRecord)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let swapped = sqlx::query(
            r#"
            UPDATE proposals
            SET status = 'executed', executed_at = ?, executed_by = ?, tx_hash = ?
            WHERE id = ? AND status = 'approved'
            "#,
        )
        .bind(to_millis(commit.executed_at))
        .bind(&commit.executed_by)
        .bind(&commit.tx_hash)
        .bind(&commit.proposal_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if swapped == 0 {
            let proposal = require_proposal(&mut tx, &commit.proposal_id).await?;
            return Err(TreasuryError::Conflict(format!(
                "proposal {} is {}, not approved",
                commit.proposal_id, proposal.status
            )));
        }

        let proposal = require_proposal(&mut tx, &commit.proposal_id).await?;
        let amount = to_db_amount(proposal.amount)?;

        let debited = sqlx::query(
            "UPDATE communities SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(amount)
        .bind(&proposal.community_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if debited == 0 {
            let community = load_community(&mut tx, &proposal.community_id)
                .await?
                .ok_or_else(|| {
                    TreasuryError::NotFound(format!("community {}", proposal.community_id))
                })?;
            return Err(TreasuryError::InsufficientBalance {
                required: proposal.amount,
                available: community.balance,
            });
        }

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

        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, proposal_id, community_id, amount, recipient_address,
                 executed_by, executed_at, tx_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.proposal_id)
        .bind(&record.community_id)
        .bind(amount)
        .bind(&record.recipient_address)
        .bind(&record.executed_by)
        .bind(to_millis(record.executed_at))
        .bind(&record.tx_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            write_err(
                e,
                || format!("proposal {} already has a transaction", record.proposal_id),
                || format!("proposal {}", record.proposal_id),
            )
        })?;

        tx.commit().await.map_err(db_err)?;
        Ok((proposal, record))
    }

    async fn list_transactions(
        &self,
        community_id: &str,
    ) -> TreasuryResult<Vec<TransactionRecord>> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT t.*, p.title AS proposal_title
            FROM transactions t
            LEFT JOIN proposals p ON t.proposal_id = p.id
            WHERE t.community_id = ?
            ORDER BY t.executed_at DESC
            "#,
        )
        .bind(community_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}
