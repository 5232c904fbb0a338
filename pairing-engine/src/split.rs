//! Split/unsplit engine
//!
//! Converts one raw transaction into N categorized line items and back.
//! Both directions are a delete-then-insert committed in one batch under
//! the raw transaction's lock, so no reader ever observes a raw
//! transaction with zero main rows.

use ledger_store::{
    Error, LockRegistry, MainTransaction, Result, Storage, TransactionId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One line item of a split
#[derive(Debug, Clone)]
pub struct SplitItem {
    /// Category for this line
    pub category_id: Option<Uuid>,

    /// Line amount; items must sum exactly to the raw transaction amount
    pub amount: Decimal,

    /// Optional line notes, used as the line's description
    pub notes: Option<String>,
}

/// Split/unsplit operations over the ledger store
pub struct SplitEngine {
    storage: Arc<Storage>,
    locks: Arc<LockRegistry>,
}

impl SplitEngine {
    /// Create a new engine
    pub fn new(storage: Arc<Storage>, locks: Arc<LockRegistry>) -> Self {
        Self { storage, locks }
    }

    /// Split a raw transaction into categorized line items
    ///
    /// Item amounts must sum exactly to the raw transaction's amount; the
    /// tolerance is zero, so any rounding mismatch is a validation error
    /// rather than silently absorbed.
    pub async fn split_transaction(
        &self,
        raw_id: &TransactionId,
        items: &[SplitItem],
    ) -> Result<Vec<MainTransaction>> {
        let _guard = self.locks.lock(raw_id.as_str()).await;

        let raw = self.storage.get_raw_transaction(raw_id)?;

        if items.is_empty() {
            return Err(Error::Validation(
                "split requires at least one line item".to_string(),
            ));
        }
        for item in items {
            if item.amount <= Decimal::ZERO {
                return Err(Error::Validation(
                    "split line amounts must be positive".to_string(),
                ));
            }
        }
        let total: Decimal = items.iter().map(|item| item.amount).sum();
        if total != raw.entry.amount() {
            return Err(Error::Validation(format!(
                "split line amounts sum to {} but the transaction amount is {}",
                total,
                raw.entry.amount()
            )));
        }

        let existing = self.storage.main_transactions_for_raw(raw_id)?;
        self.reject_linked(&existing, "split")?;

        let mut batch = self.storage.batch();
        for old in &existing {
            batch.delete_main_transaction(old)?;
        }

        let mut created = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut main = MainTransaction::derived_from(&raw);
            main.category_id = item.category_id;
            main.amount = item.amount;
            main.is_split = true;
            main.split_sequence = (i + 1) as u32;
            if let Some(notes) = &item.notes {
                main.description = notes.clone();
            }
            batch.put_main_transaction(&main)?;
            created.push(main);
        }
        batch.commit()?;

        info!(
            raw_transaction_id = %raw_id,
            lines = created.len(),
            "Transaction split"
        );

        Ok(created)
    }

    /// Collapse a split transaction back to a single row
    ///
    /// The re-created row takes the first split's category and type as
    /// defaults and the raw transaction's original amount and direction.
    pub async fn unsplit_transaction(&self, raw_id: &TransactionId) -> Result<MainTransaction> {
        let _guard = self.locks.lock(raw_id.as_str()).await;

        let raw = self.storage.get_raw_transaction(raw_id)?;

        let existing = self.storage.main_transactions_for_raw(raw_id)?;
        if existing.is_empty() {
            return Err(Error::NotFound(format!(
                "no main transactions for raw transaction {}",
                raw_id
            )));
        }
        if !existing.iter().any(|m| m.is_split) {
            return Err(Error::Validation(format!(
                "transaction {} is not split",
                raw_id
            )));
        }
        self.reject_linked(&existing, "unsplit")?;

        let first = &existing[0];
        let mut main = MainTransaction::derived_from(&raw);
        main.transaction_type = first.transaction_type;
        main.category_id = first.category_id;

        let mut batch = self.storage.batch();
        for old in &existing {
            batch.delete_main_transaction(old)?;
        }
        batch.put_main_transaction(&main)?;
        batch.commit()?;

        info!(raw_transaction_id = %raw_id, "Transaction unsplit");

        Ok(main)
    }

    /// Matched or drawdown-linked rows cannot be restructured; the link
    /// would dangle
    fn reject_linked(&self, rows: &[MainTransaction], operation: &str) -> Result<()> {
        for row in rows {
            if row.is_matched() {
                return Err(Error::Validation(format!(
                    "cannot {} transaction {}: line {} is matched, unmatch it first",
                    operation, row.raw_transaction_id, row.id
                )));
            }
            if !row.drawdown_links().is_empty() {
                return Err(Error::Validation(format!(
                    "cannot {} transaction {}: line {} is linked to a drawdown",
                    operation, row.raw_transaction_id, row.id
                )));
            }
        }
        Ok(())
    }
}
