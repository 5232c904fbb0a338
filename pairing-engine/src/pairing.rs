//! Pairing engine: two-sided linked transactions
//!
//! A matched pair is one real-world money movement recorded on two
//! accounts. The symmetric link is written to both rows in a single batch,
//! so an asymmetric link can never be persisted; preconditions are
//! re-checked under the raw transactions' locks at write time, so a
//! concurrent second matcher fails with a conflict instead of overwriting
//! the first link.

use crate::drawdown::UnmatchCascade;
use ledger_store::{
    Error, LockRegistry, MainTransaction, Result, Storage,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The two sides of a matched pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    /// The side passed first
    pub first: Uuid,
    /// The side passed second
    pub second: Uuid,
}

/// Match/unmatch and drawdown operations over the ledger store
pub struct PairingEngine {
    pub(crate) storage: Arc<Storage>,
    pub(crate) locks: Arc<LockRegistry>,
}

impl PairingEngine {
    /// Create a new engine
    pub fn new(storage: Arc<Storage>, locks: Arc<LockRegistry>) -> Self {
        Self { storage, locks }
    }

    /// Link two main transactions as the two sides of one money movement
    ///
    /// Accepts the sides in either order. All preconditions are enforced
    /// before any write, and re-checked after taking the locks.
    pub async fn match_transfer(&self, first_id: Uuid, second_id: Uuid) -> Result<MatchedPair> {
        if first_id == second_id {
            return Err(Error::Validation(
                "cannot match a transaction with itself".to_string(),
            ));
        }

        // Unlocked read to learn the raw transaction ids, which key the locks
        let first = self.storage.get_main_transaction(first_id)?;
        let second = self.storage.get_main_transaction(second_id)?;

        let keys = vec![
            first.raw_transaction_id.as_str().to_string(),
            second.raw_transaction_id.as_str().to_string(),
        ];
        let _guards = self.locks.lock_all(&keys).await;

        // Re-read under the locks; the matched-state check below is the
        // compare-and-swap against concurrent matchers
        let first = self.storage.get_main_transaction(first_id)?;
        let second = self.storage.get_main_transaction(second_id)?;

        self.validate_pair(&first, &second)?;

        let mut linked_first = first.clone();
        linked_first.matched_transaction_id = Some(second.id);
        let mut linked_second = second.clone();
        linked_second.matched_transaction_id = Some(first.id);

        let mut batch = self.storage.batch();
        batch.update_main_transaction(&first, &linked_first)?;
        batch.update_main_transaction(&second, &linked_second)?;
        batch.commit()?;

        info!(
            first = %first.id,
            second = %second.id,
            pair_type = %first.transaction_type,
            "Transactions matched"
        );

        Ok(MatchedPair {
            first: first.id,
            second: second.id,
        })
    }

    fn validate_pair(&self, first: &MainTransaction, second: &MainTransaction) -> Result<()> {
        if !first.transaction_type.pairs_with(second.transaction_type) {
            return Err(Error::Validation(format!(
                "transaction types {} and {} do not form a valid pair",
                first.transaction_type, second.transaction_type
            )));
        }
        if first.account_id == second.account_id {
            return Err(Error::Validation(format!(
                "both sides are on account {}",
                first.account_id
            )));
        }

        let first_account = self.storage.get_account(&first.account_id)?;
        let second_account = self.storage.get_account(&second.account_id)?;
        if first_account.entity_id != second_account.entity_id {
            return Err(Error::Validation(format!(
                "accounts {} and {} belong to different entities",
                first.account_id, second.account_id
            )));
        }

        if first.matched_transaction_id.is_some() {
            return Err(Error::Conflict(format!(
                "transaction {} is already matched",
                first.id
            )));
        }
        if second.matched_transaction_id.is_some() {
            return Err(Error::Conflict(format!(
                "transaction {} is already matched",
                second.id
            )));
        }

        let difference = (first.amount - second.amount).abs();
        if difference > ledger_store::types::rounding_tolerance() {
            return Err(Error::Validation(format!(
                "amounts differ beyond tolerance: {} vs {}",
                first.amount, second.amount
            )));
        }

        Ok(())
    }

    /// Tear down a matched pair
    ///
    /// For a repayment side carrying a drawdown reference, the cascade also
    /// deletes the settlement transaction and any credit memos generated
    /// for overpayment, restores the drawdown's remaining balance, and
    /// clears the drawdown reference — all in the same atomic batch, so a
    /// partial cascade is never observable.
    pub async fn unmatch_transfer(&self, id: Uuid) -> Result<()> {
        // Unlocked read to learn the lock keys
        let main = self.storage.get_main_transaction(id)?;
        let partner_id = main.matched_transaction_id.ok_or_else(|| {
            Error::Validation(format!("transaction {} is not matched", id))
        })?;
        let partner = self.storage.get_main_transaction(partner_id)?;

        let mut keys = vec![
            main.raw_transaction_id.as_str().to_string(),
            partner.raw_transaction_id.as_str().to_string(),
        ];
        for side in [&main, &partner] {
            if let Some(drawdown_id) = side.drawdown_id {
                keys.push(drawdown_id.to_string());
            }
        }
        let _guards = self.locks.lock_all(&keys).await;

        // Re-read under the locks
        let main = self.storage.get_main_transaction(id)?;
        let partner_id = main.matched_transaction_id.ok_or_else(|| {
            Error::Validation(format!("transaction {} is not matched", id))
        })?;
        let partner = self.storage.get_main_transaction(partner_id)?;

        if partner.matched_transaction_id != Some(main.id) {
            // The single-batch link update makes this unreachable; if it
            // ever trips, the store needs manual attention
            return Err(Error::Integrity(format!(
                "asymmetric matched link between {} and {}",
                main.id, partner.id
            )));
        }

        let mut unlinked_main = main.clone();
        unlinked_main.matched_transaction_id = None;
        let mut unlinked_partner = partner.clone();
        unlinked_partner.matched_transaction_id = None;

        let mut batch = self.storage.batch();

        // Repayment sides drag their dependent records with them
        for (side, unlinked) in [
            (&main, &mut unlinked_main),
            (&partner, &mut unlinked_partner),
        ] {
            if side.transaction_type.is_repayment() {
                if let Some(drawdown_id) = side.drawdown_id {
                    let cascade = UnmatchCascade::collect(&self.storage, side, drawdown_id)?;
                    cascade.apply(&mut batch)?;
                    unlinked.drawdown_id = None;
                }
            }
        }

        batch.update_main_transaction(&main, &unlinked_main)?;
        batch.update_main_transaction(&partner, &unlinked_partner)?;
        batch.commit()?;

        info!(first = %main.id, second = %partner.id, "Transactions unmatched");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_account, seed_typed_transaction, test_context};
    use ledger_store::{AccountType, TransactionType};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_match_links_both_sides() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-y", AccountType::Bank, "entity-1");

        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(500_000, 0),
        );
        let inn = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferIn,
            Decimal::new(500_000, 0),
        );

        let pair = engine.match_transfer(out.id, inn.id).await.unwrap();
        assert_eq!(pair.first, out.id);
        assert_eq!(pair.second, inn.id);

        let out = storage.get_main_transaction(out.id).unwrap();
        let inn = storage.get_main_transaction(inn.id).unwrap();
        assert_eq!(out.matched_transaction_id, Some(inn.id));
        assert_eq!(inn.matched_transaction_id, Some(out.id));
    }

    #[tokio::test]
    async fn test_match_repeated_conflicts_and_preserves_link() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-y", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-z", AccountType::Bank, "entity-1");

        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(500_000, 0),
        );
        let inn = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferIn,
            Decimal::new(500_000, 0),
        );
        let third = seed_typed_transaction(
            &storage,
            "bank-z",
            TransactionType::TransferIn,
            Decimal::new(500_000, 0),
        );

        engine.match_transfer(out.id, inn.id).await.unwrap();

        // Same pair again
        let err = engine.match_transfer(out.id, inn.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Already-matched side against a third transaction
        let err = engine.match_transfer(out.id, third.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Original link untouched
        let out = storage.get_main_transaction(out.id).unwrap();
        assert_eq!(out.matched_transaction_id, Some(inn.id));
        let third = storage.get_main_transaction(third.id).unwrap();
        assert!(third.matched_transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_match_rejects_bad_pairs() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-y", AccountType::Bank, "entity-1");

        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(100, 0),
        );

        // Self-match
        let err = engine.match_transfer(out.id, out.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Wrong type combination
        let wrong = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferOut,
            Decimal::new(100, 0),
        );
        let err = engine.match_transfer(out.id, wrong.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Same account
        let same_account = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferIn,
            Decimal::new(100, 0),
        );
        let err = engine
            .match_transfer(out.id, same_account.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Amount beyond tolerance
        let off = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferIn,
            Decimal::new(10002, 2),
        );
        let err = engine.match_transfer(out.id, off.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_match_within_tolerance_succeeds() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-y", AccountType::Bank, "entity-1");

        // One cent apart: inside the 0.01 rounding tolerance
        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(10000, 2),
        );
        let inn = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferIn,
            Decimal::new(10001, 2),
        );

        engine.match_transfer(out.id, inn.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_match_rejects_cross_entity() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-other", AccountType::Bank, "entity-2");

        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(100, 0),
        );
        let inn = seed_typed_transaction(
            &storage,
            "bank-other",
            TransactionType::TransferIn,
            Decimal::new(100, 0),
        );

        let err = engine.match_transfer(out.id, inn.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unmatch_clears_both_sides() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-x", AccountType::Bank, "entity-1");
        seed_account(&storage, "bank-y", AccountType::Bank, "entity-1");

        let out = seed_typed_transaction(
            &storage,
            "bank-x",
            TransactionType::TransferOut,
            Decimal::new(100, 0),
        );
        let inn = seed_typed_transaction(
            &storage,
            "bank-y",
            TransactionType::TransferIn,
            Decimal::new(100, 0),
        );

        engine.match_transfer(out.id, inn.id).await.unwrap();
        engine.unmatch_transfer(out.id).await.unwrap();

        let out = storage.get_main_transaction(out.id).unwrap();
        let inn = storage.get_main_transaction(inn.id).unwrap();
        assert!(out.matched_transaction_id.is_none());
        assert!(inn.matched_transaction_id.is_none());

        // Unmatching again is a validation error
        let err = engine.unmatch_transfer(out.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unmatch_missing_not_found() {
        let (engine, _storage, _temp) = test_context();
        let err = engine.unmatch_transfer(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
