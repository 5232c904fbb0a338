//! Balance reconciliation engine
//!
//! Explains any gap between what the ledger computes and what was declared
//! as truth at a checkpoint. The scan is a single sequential pass in
//! (date, sequence) order — `last_known` is a running accumulator, so the
//! order is a correctness requirement, not a performance choice. The scan
//! is read-only: discrepancies are its normal output, not errors.

use chrono::NaiveDate;
use ledger_store::{
    types::rounding_tolerance, AccountId, CheckpointSource, EntryAmount, Error, RawTransaction,
    Result, Storage, TransactionId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What ground truth a discrepancy was measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancySource {
    /// A running balance declared on a statement row within the window
    DeclaredBalance,
    /// The target checkpoint's own declared balance
    Checkpoint(CheckpointSource),
}

/// One date where the ledger disagrees with a declared balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Date of the disagreement
    pub date: NaiveDate,

    /// Balance the ledger rolled forward to
    pub expected_balance: Decimal,

    /// Balance the source declared
    pub actual_balance: Decimal,

    /// `actual − expected`
    pub difference: Decimal,

    /// That day's credits (adjustments excluded)
    pub total_credits: Decimal,

    /// That day's debits (adjustments excluded)
    pub total_debits: Decimal,

    /// Every transaction dated that day
    pub transactions: Vec<TransactionId>,

    /// What the expectation was compared against
    pub source: DiscrepancySource,
}

/// Full result of one reconciliation scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    /// Account scanned
    pub account_id: AccountId,

    /// Target checkpoint
    pub checkpoint_id: Uuid,

    /// Window start (previous checkpoint date, exclusive), if any
    pub window_start: Option<NaiveDate>,

    /// Window end (target checkpoint date, inclusive)
    pub window_end: NaiveDate,

    /// Anchor balance the walk started from
    pub opening_balance: Decimal,

    /// Balance the walk ended on
    pub closing_expected: Decimal,

    /// Dates where declared and computed balances disagree
    pub discrepancies: Vec<Discrepancy>,
}

/// Read-only reconciliation over the ledger store
pub struct ReconciliationEngine {
    storage: Arc<Storage>,
}

impl ReconciliationEngine {
    /// Create a new engine
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Explain the gap between computed and declared balances at a
    /// checkpoint
    ///
    /// Targets the given checkpoint, or the account's latest when `None`.
    /// Pure function of stored state: repeated calls return the same
    /// report.
    pub async fn investigate_discrepancies(
        &self,
        account_id: &AccountId,
        checkpoint_id: Option<Uuid>,
    ) -> Result<DiscrepancyReport> {
        self.storage.get_account(account_id)?;

        let target = match checkpoint_id {
            Some(id) => {
                let checkpoint = self.storage.get_checkpoint(id)?;
                if &checkpoint.account_id != account_id {
                    return Err(Error::Validation(format!(
                        "checkpoint {} belongs to account {}, not {}",
                        id, checkpoint.account_id, account_id
                    )));
                }
                checkpoint
            }
            None => self
                .storage
                .latest_checkpoint(account_id)?
                .ok_or_else(|| {
                    Error::NotFound(format!("account {} has no checkpoints", account_id))
                })?,
        };

        let previous = self
            .storage
            .previous_checkpoint(account_id, target.date, target.id)?;
        let window_start = previous.as_ref().map(|p| p.date);
        let opening_balance = previous
            .as_ref()
            .map(|p| p.declared_balance)
            .unwrap_or(Decimal::ZERO);

        let mut discrepancies = Vec::new();
        let mut last_known = opening_balance;

        // Stream the window in (date, sequence) order, bucketing by day;
        // the iterator never materializes the whole window
        let mut day: Vec<RawTransaction> = Vec::new();
        let mut day_date: Option<NaiveDate> = None;
        for item in
            self.storage
                .raw_transactions_in_window(account_id, window_start, target.date)?
        {
            let txn = item?;
            match day_date {
                Some(date) if date == txn.date => day.push(txn),
                Some(date) => {
                    walk_day(date, &day, &mut last_known, &mut discrepancies);
                    day.clear();
                    day_date = Some(txn.date);
                    day.push(txn);
                }
                None => {
                    day_date = Some(txn.date);
                    day.push(txn);
                }
            }
        }
        if let Some(date) = day_date {
            walk_day(date, &day, &mut last_known, &mut discrepancies);
        }

        // Final comparison against the checkpoint's own declared balance
        let difference = target.declared_balance - last_known;
        if difference.abs() > rounding_tolerance() {
            discrepancies.push(Discrepancy {
                date: target.date,
                expected_balance: last_known,
                actual_balance: target.declared_balance,
                difference,
                total_credits: Decimal::ZERO,
                total_debits: Decimal::ZERO,
                transactions: Vec::new(),
                source: DiscrepancySource::Checkpoint(target.source()),
            });
        }

        info!(
            account_id = %account_id,
            checkpoint_id = %target.id,
            discrepancies = discrepancies.len(),
            "Reconciliation scan complete"
        );

        Ok(DiscrepancyReport {
            account_id: account_id.clone(),
            checkpoint_id: target.id,
            window_start,
            window_end: target.date,
            opening_balance,
            closing_expected: last_known,
            discrepancies,
        })
    }
}

/// Advance `last_known` over one day's transactions, recording a
/// discrepancy when a declared running balance disagrees with the
/// rolled-forward expectation
fn walk_day(
    date: NaiveDate,
    transactions: &[RawTransaction],
    last_known: &mut Decimal,
    discrepancies: &mut Vec<Discrepancy>,
) {
    let mut credits = Decimal::ZERO;
    let mut debits = Decimal::ZERO;
    for txn in transactions {
        // Adjustments are corrections, not real flow; counting them would
        // double-count them against themselves
        if txn.is_balance_adjustment {
            continue;
        }
        match txn.entry {
            EntryAmount::Credit(amount) => credits += amount,
            EntryAmount::Debit(amount) => debits += amount,
        }
    }

    let expected = *last_known + (credits - debits);

    // The day's last declared running balance, in sequence order
    let declared = transactions
        .iter()
        .filter_map(|txn| txn.declared_balance)
        .last();

    match declared {
        Some(actual) => {
            let difference = actual - expected;
            if difference.abs() > rounding_tolerance() {
                discrepancies.push(Discrepancy {
                    date,
                    expected_balance: expected,
                    actual_balance: actual,
                    difference,
                    total_credits: credits,
                    total_debits: debits,
                    transactions: transactions.iter().map(|txn| txn.id.clone()).collect(),
                    source: DiscrepancySource::DeclaredBalance,
                });
            }
            // Declared truth becomes the new anchor either way
            *last_known = actual;
        }
        None => {
            // Nothing to compare against; carry the expectation forward
            *last_known = expected;
        }
    }
}
