//! Ledger Store
//!
//! Implementations of [`treasury_core::LedgerStore`]:
//! - [`MemoryLedgerStore`]: a single write lock around all state, used in
//!   tests and ephemeral nodes
//! - [`SqliteLedgerStore`]: sqlx/SQLite with WAL, an embedded migration and
//!   one SQL transaction per atomic operation

pub mod memory;
pub mod sqlite;

pub use memory::MemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;
