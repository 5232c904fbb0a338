//! Tallybook Pairing Engine
//!
//! Two-sided linked transactions over the ledger store: transfers between
//! accounts, debt drawdowns and repayments, loan disbursements and
//! collections — plus the split/unsplit engine for categorized line items.
//!
//! # Invariants
//!
//! - Matched links are symmetric, written to both rows in one batch
//! - A second concurrent matcher conflicts instead of overwriting
//! - Multi-step writes either commit whole or compensate in reverse order
//! - Split amounts sum exactly to the raw transaction amount

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod drawdown;
pub mod pairing;
pub mod saga;
pub mod split;

#[cfg(test)]
mod testutil;

// Re-exports
pub use drawdown::{DrawdownCreated, DrawdownRequest, RepaymentApplied};
pub use pairing::{MatchedPair, PairingEngine};
pub use saga::Saga;
pub use split::{SplitEngine, SplitItem};
