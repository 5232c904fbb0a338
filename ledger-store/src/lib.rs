//! Tallybook Ledger Store
//!
//! Persisted state for the finance tracker core: raw transactions, derived
//! main transactions, accounts, balances, checkpoints, drawdowns.
//!
//! # Architecture
//!
//! - **Single owner**: every engine mutates the ledger through this crate;
//!   nothing else writes the tables
//! - **Atomic batches**: multi-row writes commit through one `WriteBatch`
//! - **Ordered indices**: (date, sequence) scans fall out of key encoding
//! - **Per-key locks**: preconditions are re-checked at write time
//!
//! # Invariants
//!
//! - Every raw transaction has at least one main transaction
//! - A raw transaction carries exactly one debit-or-credit amount
//! - Split amounts sum to the raw amount; split sequences are unique
//! - Matched links are symmetric: A points at B iff B points at A
//! - Drawdowns: remaining = principal − Σ(payments) − written off, ≥ 0

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use lock::LockRegistry;
pub use metrics::Metrics;
pub use storage::{Batch, Storage};
pub use types::{
    Account, AccountBalance, AccountId, AccountType, Checkpoint, CheckpointSource, Counterparty,
    Currency, Direction, Drawdown, DrawdownKind, DrawdownStatus, EntityId, EntryAmount,
    MainTransaction, RawTransaction, TransactionId, TransactionType,
};
