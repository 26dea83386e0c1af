//! Treasury Core
//!
//! Shared types for the community treasury workspace:
//! - Entities (communities, proposals, transaction records)
//! - Lovelace amounts and ADA conversion
//! - The typed error taxonomy returned by every intent
//! - The `LedgerStore` and `ChainSubmitter` seams
//! - Wallet sessions with change notification

pub mod amount;
pub mod chain;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

pub use amount::{Lovelace, LOVELACE_PER_ADA};
pub use chain::{ChainSubmitter, SigningCredential, SubmissionError, SubmissionRequest};
pub use error::{TreasuryError, TreasuryResult};
pub use models::*;
pub use session::{is_valid_cardano_address, WalletSession};
pub use store::{ExecutionCommit, LedgerStore};
