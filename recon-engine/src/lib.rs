//! Tallybook Reconciliation Engine
//!
//! Checkpoint declarations and the balance reconciliation scan: computes a
//! running balance from raw transactions, compares it against declared
//! checkpoint balances, and surfaces day-by-day discrepancies with the
//! transactions that caused them.
//!
//! The scan never mutates the ledger; a discrepancy is normal output for a
//! human to act on, not an error.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod checkpoint;
pub mod engine;

// Re-exports
pub use checkpoint::CheckpointService;
pub use engine::{Discrepancy, DiscrepancyReport, DiscrepancySource, ReconciliationEngine};
