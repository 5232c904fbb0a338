//! Drawdown and disbursement flows
//!
//! Creating a drawdown is a four-part write: the drawdown record, one
//! transaction per account, and the symmetric link. The parts commit
//! step-by-step through a [`Saga`](crate::saga::Saga) so any failure
//! unwinds everything already written. Repayment application and the
//! unmatch cascade keep the drawdown invariant
//! `remaining = principal − Σ(payments) − written_off` intact.

use crate::pairing::PairingEngine;
use crate::saga::Saga;
use chrono::{NaiveDate, Utc};
use ledger_store::{
    storage::Batch, AccountId, Drawdown, DrawdownKind, DrawdownStatus, EntryAmount, Error,
    MainTransaction, RawTransaction, Result, Storage, TransactionId, TransactionType,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Inputs for a drawdown or disbursement
#[derive(Debug, Clone)]
pub struct DrawdownRequest {
    /// Bank/cash account the money moves through
    pub source_account_id: AccountId,

    /// Debt or loan account the principal is tracked on
    pub drawdown_account_id: AccountId,

    /// Principal amount
    pub amount: Decimal,

    /// Business partner on the other end
    pub counterparty_id: Uuid,

    /// Ledger date
    pub date: NaiveDate,

    /// Description for both transactions
    pub description: String,

    /// Optional due date
    pub due_date: Option<NaiveDate>,
}

/// A created drawdown with its paired transactions
#[derive(Debug, Clone)]
pub struct DrawdownCreated {
    /// The drawdown record, remaining balance at full principal
    pub drawdown: Drawdown,

    /// The "give" side on the bank/cash account (credit)
    pub source_transaction: MainTransaction,

    /// The "settle" side on the debt/loan account (debit)
    pub drawdown_transaction: MainTransaction,
}

/// Result of applying a repayment to a drawdown
#[derive(Debug, Clone)]
pub struct RepaymentApplied {
    /// Drawdown after the principal reduction
    pub drawdown: Drawdown,

    /// Settlement transaction written to the drawdown account
    pub settlement: MainTransaction,

    /// Credit memo, present when the payment exceeded the remaining balance
    pub credit_memo: Option<MainTransaction>,
}

impl PairingEngine {
    /// Record a debt drawdown: money drawn from a credit line, card, or
    /// term loan into a bank/cash account
    pub async fn create_drawdown(&self, request: DrawdownRequest) -> Result<DrawdownCreated> {
        self.create_drawdown_pair(DrawdownKind::Debt, request).await
    }

    /// Record a loan disbursement: money lent out of a bank/cash account,
    /// tracked on a loan-receivable account
    pub async fn create_disbursement(&self, request: DrawdownRequest) -> Result<DrawdownCreated> {
        self.create_drawdown_pair(DrawdownKind::Loan, request).await
    }

    async fn create_drawdown_pair(
        &self,
        kind: DrawdownKind,
        request: DrawdownRequest,
    ) -> Result<DrawdownCreated> {
        let keys = vec![
            request.source_account_id.as_str().to_string(),
            request.drawdown_account_id.as_str().to_string(),
        ];
        let _guards = self.locks.lock_all(&keys).await;

        // All preconditions enforced before any write
        if request.amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "drawdown amount must be positive".to_string(),
            ));
        }
        let source = self.storage.get_account(&request.source_account_id)?;
        let target = self.storage.get_account(&request.drawdown_account_id)?;
        if !source.account_type.is_cash_side() {
            return Err(Error::Validation(format!(
                "source account {} must be a bank or cash account",
                source.id
            )));
        }
        let target_type_ok = match kind {
            DrawdownKind::Debt => target.account_type.is_debt(),
            DrawdownKind::Loan => target.account_type == ledger_store::AccountType::LoanReceivable,
        };
        if !target_type_ok {
            return Err(Error::Validation(format!(
                "account {} has the wrong type for a {} drawdown",
                target.id,
                match kind {
                    DrawdownKind::Debt => "debt",
                    DrawdownKind::Loan => "loan",
                }
            )));
        }
        if source.entity_id != target.entity_id {
            return Err(Error::Validation(format!(
                "accounts {} and {} belong to different entities",
                source.id, target.id
            )));
        }
        let counterparty = self.storage.get_counterparty(request.counterparty_id)?;

        let txn_type = match kind {
            DrawdownKind::Debt => TransactionType::DebtTake,
            DrawdownKind::Loan => TransactionType::LoanDisburse,
        };

        let drawdown = Drawdown {
            id: Uuid::new_v4(),
            kind,
            account_id: target.id.clone(),
            counterparty_id: counterparty.id,
            principal_amount: request.amount,
            remaining_balance: request.amount,
            written_off_amount: Decimal::ZERO,
            status: DrawdownStatus::Active,
            opened_on: request.date,
            due_date: request.due_date,
        };

        // The "give" side: money leaves the cash account
        let give_raw = RawTransaction {
            id: TransactionId::generate(),
            account_id: source.id.clone(),
            date: request.date,
            sequence: self.storage.next_sequence(&source.id, request.date)?,
            description: request.description.clone(),
            entry: EntryAmount::Credit(request.amount),
            declared_balance: None,
            is_balance_adjustment: false,
            checkpoint_id: None,
            notes: None,
            created_at: Utc::now(),
        };
        let mut give_main = MainTransaction::derived_from(&give_raw);
        give_main.transaction_type = txn_type;

        // The "settle" side: the debt/loan position grows
        let settle_raw = RawTransaction {
            id: TransactionId::generate(),
            account_id: target.id.clone(),
            date: request.date,
            sequence: self.storage.next_sequence(&target.id, request.date)?,
            description: request.description.clone(),
            entry: EntryAmount::Debit(request.amount),
            declared_balance: None,
            is_balance_adjustment: false,
            checkpoint_id: None,
            notes: None,
            created_at: Utc::now(),
        };
        let mut settle_main = MainTransaction::derived_from(&settle_raw);
        settle_main.transaction_type = txn_type;

        let mut saga = Saga::new(&self.storage, "create_drawdown");

        saga.step(
            "create_drawdown_record",
            json!({ "drawdown_id": drawdown.id.to_string() }),
            |s| s.put_drawdown(&drawdown),
            {
                let id = drawdown.id;
                move |s| s.delete_drawdown(id)
            },
        )?;

        saga.step(
            "record_source_transaction",
            json!({ "raw_transaction_id": give_raw.id.as_str() }),
            |s| {
                let mut batch = s.batch();
                batch.insert_transaction(&give_raw, &give_main)?;
                batch.commit()
            },
            {
                let raw = give_raw.clone();
                let main = give_main.clone();
                move |s| {
                    let mut batch = s.batch();
                    batch.delete_main_transaction(&main)?;
                    batch.delete_raw_transaction(&raw)?;
                    batch.commit()
                }
            },
        )?;

        saga.step(
            "record_drawdown_transaction",
            json!({ "raw_transaction_id": settle_raw.id.as_str() }),
            |s| {
                let mut batch = s.batch();
                batch.insert_transaction(&settle_raw, &settle_main)?;
                batch.commit()
            },
            {
                let raw = settle_raw.clone();
                let main = settle_main.clone();
                move |s| {
                    let mut batch = s.batch();
                    batch.delete_main_transaction(&main)?;
                    batch.delete_raw_transaction(&raw)?;
                    batch.commit()
                }
            },
        )?;

        let (linked_give, linked_settle) = saga.step(
            "link_pair",
            json!({
                "first": give_main.id.to_string(),
                "second": settle_main.id.to_string(),
            }),
            |s| {
                let mut lg = give_main.clone();
                lg.matched_transaction_id = Some(settle_main.id);
                lg.drawdown_id = Some(drawdown.id);
                let mut ls = settle_main.clone();
                ls.matched_transaction_id = Some(give_main.id);
                ls.drawdown_id = Some(drawdown.id);

                let mut batch = s.batch();
                batch.update_main_transaction(&give_main, &lg)?;
                batch.update_main_transaction(&settle_main, &ls)?;
                batch.commit()?;
                Ok((lg, ls))
            },
            {
                let give = give_main.clone();
                let settle = settle_main.clone();
                let drawdown_id = drawdown.id;
                move |s| {
                    let mut lg = give.clone();
                    lg.matched_transaction_id = Some(settle.id);
                    lg.drawdown_id = Some(drawdown_id);
                    let mut ls = settle.clone();
                    ls.matched_transaction_id = Some(give.id);
                    ls.drawdown_id = Some(drawdown_id);

                    let mut batch = s.batch();
                    batch.update_main_transaction(&lg, &give)?;
                    batch.update_main_transaction(&ls, &settle)?;
                    batch.commit()
                }
            },
        )?;

        saga.commit();

        info!(
            drawdown_id = %drawdown.id,
            kind = ?kind,
            amount = %request.amount,
            counterparty = %counterparty.name,
            "Drawdown created"
        );

        Ok(DrawdownCreated {
            drawdown,
            source_transaction: linked_give,
            drawdown_transaction: linked_settle,
        })
    }

    /// Apply a matched repayment to a drawdown
    ///
    /// Reduces the remaining balance by the payment amount (capped at the
    /// balance); any excess becomes a credit memo on the drawdown account.
    /// Writes the settlement transaction the unmatch cascade later tears
    /// down.
    pub async fn apply_repayment(
        &self,
        payment_id: Uuid,
        drawdown_id: Uuid,
    ) -> Result<RepaymentApplied> {
        // Unlocked read to learn the lock keys
        let payment = self.storage.get_main_transaction(payment_id)?;
        let drawdown = self.storage.get_drawdown(drawdown_id)?;

        let keys = vec![
            payment.raw_transaction_id.as_str().to_string(),
            drawdown_id.to_string(),
            drawdown.account_id.as_str().to_string(),
        ];
        let _guards = self.locks.lock_all(&keys).await;

        // Re-read under the locks
        let payment = self.storage.get_main_transaction(payment_id)?;
        let drawdown = self.storage.get_drawdown(drawdown_id)?;

        let expected_type = match drawdown.kind {
            DrawdownKind::Debt => TransactionType::DebtPay,
            DrawdownKind::Loan => TransactionType::LoanCollect,
        };
        if payment.transaction_type != expected_type {
            return Err(Error::Validation(format!(
                "transaction type {} cannot settle a {:?} drawdown",
                payment.transaction_type, drawdown.kind
            )));
        }
        if payment.matched_transaction_id.is_none() {
            return Err(Error::Validation(format!(
                "repayment {} must be matched to its counter-side first",
                payment.id
            )));
        }
        if payment.drawdown_id.is_some() {
            return Err(Error::Conflict(format!(
                "repayment {} is already applied to a drawdown",
                payment.id
            )));
        }
        if drawdown.is_terminal() {
            return Err(Error::Validation(format!(
                "drawdown {} is closed ({:?})",
                drawdown.id, drawdown.status
            )));
        }

        let principal = payment.amount.min(drawdown.remaining_balance);
        let overpaid = payment.amount - principal;

        let settlement_raw = RawTransaction {
            id: TransactionId::generate(),
            account_id: drawdown.account_id.clone(),
            date: payment.date,
            sequence: self.storage.next_sequence(&drawdown.account_id, payment.date)?,
            description: format!("Settlement: {}", payment.description),
            entry: EntryAmount::Credit(principal),
            declared_balance: None,
            is_balance_adjustment: false,
            checkpoint_id: None,
            notes: None,
            created_at: Utc::now(),
        };
        let mut settlement_main = MainTransaction::derived_from(&settlement_raw);
        settlement_main.transaction_type = TransactionType::Settlement;
        settlement_main.drawdown_id = Some(drawdown.id);
        settlement_main.settles_transaction_id = Some(payment.id);

        let mut updated = drawdown.clone();
        updated.apply_principal_payment(principal)?;

        let mut saga = Saga::new(&self.storage, "apply_repayment");

        saga.step(
            "record_settlement",
            json!({ "raw_transaction_id": settlement_raw.id.as_str() }),
            |s| {
                let mut batch = s.batch();
                batch.insert_transaction(&settlement_raw, &settlement_main)?;
                batch.commit()
            },
            {
                let raw = settlement_raw.clone();
                let main = settlement_main.clone();
                move |s| {
                    let mut batch = s.batch();
                    batch.delete_main_transaction(&main)?;
                    batch.delete_raw_transaction(&raw)?;
                    batch.commit()
                }
            },
        )?;

        let credit_memo = if overpaid > Decimal::ZERO {
            let memo_raw = RawTransaction {
                id: TransactionId::generate(),
                account_id: drawdown.account_id.clone(),
                date: payment.date,
                sequence: self.storage.next_sequence(&drawdown.account_id, payment.date)?,
                description: format!("Credit memo: overpayment of {}", overpaid),
                entry: EntryAmount::Credit(overpaid),
                declared_balance: None,
                is_balance_adjustment: false,
                checkpoint_id: None,
                notes: None,
                created_at: Utc::now(),
            };
            let mut memo_main = MainTransaction::derived_from(&memo_raw);
            memo_main.transaction_type = TransactionType::CreditMemo;
            memo_main.credit_memo_of_drawdown_id = Some(drawdown.id);

            saga.step(
                "record_credit_memo",
                json!({ "raw_transaction_id": memo_raw.id.as_str() }),
                |s| {
                    let mut batch = s.batch();
                    batch.insert_transaction(&memo_raw, &memo_main)?;
                    batch.commit()
                },
                {
                    let raw = memo_raw.clone();
                    let main = memo_main.clone();
                    move |s| {
                        let mut batch = s.batch();
                        batch.delete_main_transaction(&main)?;
                        batch.delete_raw_transaction(&raw)?;
                        batch.commit()
                    }
                },
            )?;

            Some(memo_main)
        } else {
            None
        };

        saga.step(
            "reduce_drawdown_balance",
            json!({
                "drawdown_id": drawdown.id.to_string(),
                "principal": principal.to_string(),
            }),
            |s| s.put_drawdown(&updated),
            {
                let original = drawdown.clone();
                move |s| s.put_drawdown(&original)
            },
        )?;

        let stamped = saga.step(
            "stamp_repayment",
            json!({ "payment_id": payment.id.to_string() }),
            |s| {
                let mut stamped = payment.clone();
                stamped.drawdown_id = Some(drawdown.id);
                let mut batch = s.batch();
                batch.update_main_transaction(&payment, &stamped)?;
                batch.commit()?;
                Ok(stamped)
            },
            {
                let payment = payment.clone();
                let drawdown_id = drawdown.id;
                move |s| {
                    let mut stamped = payment.clone();
                    stamped.drawdown_id = Some(drawdown_id);
                    let mut batch = s.batch();
                    batch.update_main_transaction(&stamped, &payment)?;
                    batch.commit()
                }
            },
        )?;

        saga.commit();

        info!(
            drawdown_id = %drawdown.id,
            payment_id = %stamped.id,
            principal = %principal,
            overpaid = %overpaid,
            remaining = %updated.remaining_balance,
            "Repayment applied"
        );

        Ok(RepaymentApplied {
            drawdown: updated,
            settlement: settlement_main,
            credit_memo,
        })
    }

    /// Write off part or all of a drawdown's remaining balance
    ///
    /// Records a non-cash adjustment transaction on the drawdown account in
    /// the same batch as the balance update. Rejected outright when the
    /// amount exceeds the remaining balance; the balance is never clamped.
    pub async fn write_off_drawdown(
        &self,
        drawdown_id: Uuid,
        amount: Decimal,
        date: NaiveDate,
        reason: &str,
    ) -> Result<Drawdown> {
        // Unlocked read to learn the lock keys
        let drawdown = self.storage.get_drawdown(drawdown_id)?;

        let keys = vec![
            drawdown_id.to_string(),
            drawdown.account_id.as_str().to_string(),
        ];
        let _guards = self.locks.lock_all(&keys).await;

        // Re-read under the locks
        let drawdown = self.storage.get_drawdown(drawdown_id)?;

        let mut updated = drawdown.clone();
        updated.apply_write_off(amount)?;

        let raw = RawTransaction {
            id: TransactionId::generate(),
            account_id: drawdown.account_id.clone(),
            date,
            sequence: self.storage.next_sequence(&drawdown.account_id, date)?,
            description: format!("Write-off: {}", reason),
            entry: EntryAmount::Credit(amount),
            declared_balance: None,
            is_balance_adjustment: true,
            checkpoint_id: None,
            notes: None,
            created_at: Utc::now(),
        };
        let mut main = MainTransaction::derived_from(&raw);
        main.transaction_type = TransactionType::LoanWriteOff;
        main.drawdown_id = Some(drawdown.id);

        let mut batch = self.storage.batch();
        batch.put_drawdown(&updated)?;
        batch.insert_transaction(&raw, &main)?;
        batch.commit()?;

        info!(
            drawdown_id = %drawdown.id,
            amount = %amount,
            remaining = %updated.remaining_balance,
            status = ?updated.status,
            "Drawdown written off"
        );

        Ok(updated)
    }
}

/// Dependent records torn down when a repayment pair is unmatched
///
/// Collected read-only first, then applied into the caller's batch so the
/// whole cascade commits with the unlink itself.
pub(crate) struct UnmatchCascade {
    updated_drawdown: Drawdown,
    deletions: Vec<(RawTransaction, MainTransaction)>,
}

impl UnmatchCascade {
    pub(crate) fn collect(
        storage: &Storage,
        payment: &MainTransaction,
        drawdown_id: Uuid,
    ) -> Result<Self> {
        let drawdown = storage.get_drawdown(drawdown_id)?;
        let dependents = storage.main_transactions_for_drawdown(drawdown_id)?;

        // This payment's settlement, located by its explicit link
        let mut deletions = Vec::new();
        let mut restored = Decimal::ZERO;
        for dependent in &dependents {
            if dependent.transaction_type == TransactionType::Settlement
                && dependent.settles_transaction_id == Some(payment.id)
            {
                restored += dependent.amount;
                let raw = storage.get_raw_transaction(&dependent.raw_transaction_id)?;
                deletions.push((raw, dependent.clone()));
            }
        }

        // Credit memos exist only when a payment overpaid, which settles
        // the drawdown; so any memo on this drawdown was generated by the
        // payment being unwound iff that payment overpaid
        let overpaid = payment.amount > restored && restored > Decimal::ZERO;
        if overpaid {
            for dependent in &dependents {
                if dependent.credit_memo_of_drawdown_id == Some(drawdown_id) {
                    let raw = storage.get_raw_transaction(&dependent.raw_transaction_id)?;
                    deletions.push((raw, dependent.clone()));
                }
            }
        }

        let mut updated_drawdown = drawdown;
        if restored > Decimal::ZERO {
            updated_drawdown.restore_principal_payment(restored);
        }

        Ok(Self {
            updated_drawdown,
            deletions,
        })
    }

    pub(crate) fn apply(&self, batch: &mut Batch<'_>) -> Result<()> {
        for (raw, main) in &self.deletions {
            batch.delete_main_transaction(main)?;
            batch.delete_raw_transaction(raw)?;
        }
        batch.put_drawdown(&self.updated_drawdown)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        seed_account, seed_counterparty, seed_typed_transaction, test_context,
    };
    use ledger_store::AccountType;
    use std::sync::Arc;

    fn request(
        source: &str,
        target: &str,
        amount: i64,
        counterparty_id: Uuid,
    ) -> DrawdownRequest {
        DrawdownRequest {
            source_account_id: AccountId::new(source),
            drawdown_account_id: AccountId::new(target),
            amount: Decimal::new(amount, 0),
            counterparty_id,
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            description: "Principal".to_string(),
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_disbursement_creates_linked_pair() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "loan-1", AccountType::LoanReceivable, "entity-1");
        let counterparty = seed_counterparty(&storage, "entity-1");

        let created = engine
            .create_disbursement(request("bank-1", "loan-1", 1_000_000, counterparty.id))
            .await
            .unwrap();

        assert_eq!(created.drawdown.remaining_balance, Decimal::new(1_000_000, 0));
        assert_eq!(created.drawdown.status, DrawdownStatus::Active);
        assert_eq!(created.drawdown.kind, DrawdownKind::Loan);

        // Both sides linked to each other and to the drawdown
        let give = storage
            .get_main_transaction(created.source_transaction.id)
            .unwrap();
        let settle = storage
            .get_main_transaction(created.drawdown_transaction.id)
            .unwrap();
        assert_eq!(give.matched_transaction_id, Some(settle.id));
        assert_eq!(settle.matched_transaction_id, Some(give.id));
        assert_eq!(give.drawdown_id, Some(created.drawdown.id));
        assert_eq!(settle.drawdown_id, Some(created.drawdown.id));
        assert_eq!(give.transaction_type, TransactionType::LoanDisburse);
        assert_eq!(settle.transaction_type, TransactionType::LoanDisburse);

        // Give side is a credit on the bank, settle side a debit on the loan
        let give_raw = storage.get_raw_transaction(&give.raw_transaction_id).unwrap();
        let settle_raw = storage
            .get_raw_transaction(&settle.raw_transaction_id)
            .unwrap();
        assert_eq!(give_raw.entry, EntryAmount::Credit(Decimal::new(1_000_000, 0)));
        assert_eq!(settle_raw.entry, EntryAmount::Debit(Decimal::new(1_000_000, 0)));
    }

    #[tokio::test]
    async fn test_drawdown_validations() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "credit-1", AccountType::CreditLine, "entity-1");
        seed_account(&storage, "loan-1", AccountType::LoanReceivable, "entity-1");
        seed_account(&storage, "other-bank", AccountType::Bank, "entity-2");
        let counterparty = seed_counterparty(&storage, "entity-1");

        // Non-positive amount
        let err = engine
            .create_drawdown(request("bank-1", "credit-1", 0, counterparty.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Wrong target type for a loan disbursement
        let err = engine
            .create_disbursement(request("bank-1", "credit-1", 100, counterparty.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Wrong source type
        let err = engine
            .create_drawdown(request("loan-1", "credit-1", 100, counterparty.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Cross-entity
        let err = engine
            .create_drawdown(request("other-bank", "credit-1", 100, counterparty.id))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Unknown counterparty
        let err = engine
            .create_drawdown(request("bank-1", "credit-1", 100, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // Nothing was written by the rejected attempts
        assert!(!storage
            .account_has_transactions(&AccountId::new("bank-1"))
            .unwrap());
    }

    #[tokio::test]
    async fn test_write_off_paths() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "loan-1", AccountType::LoanReceivable, "entity-1");
        let counterparty = seed_counterparty(&storage, "entity-1");

        let created = engine
            .create_disbursement(request("bank-1", "loan-1", 1000, counterparty.id))
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        // Exceeding the remaining balance is rejected, balance unchanged
        let err = engine
            .write_off_drawdown(created.drawdown.id, Decimal::new(1001, 0), date, "bad debt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let unchanged = storage.get_drawdown(created.drawdown.id).unwrap();
        assert_eq!(unchanged.remaining_balance, Decimal::new(1000, 0));

        // Partial write-off
        let updated = engine
            .write_off_drawdown(created.drawdown.id, Decimal::new(400, 0), date, "bad debt")
            .await
            .unwrap();
        assert_eq!(updated.status, DrawdownStatus::PartiallyWrittenOff);
        assert_eq!(updated.remaining_balance, Decimal::new(600, 0));
        assert_eq!(updated.written_off_amount, Decimal::new(400, 0));

        // The adjustment transaction exists and is flagged as non-cash
        let dependents = storage
            .main_transactions_for_drawdown(created.drawdown.id)
            .unwrap();
        let write_off = dependents
            .iter()
            .find(|m| m.transaction_type == TransactionType::LoanWriteOff)
            .unwrap();
        let raw = storage
            .get_raw_transaction(&write_off.raw_transaction_id)
            .unwrap();
        assert!(raw.is_balance_adjustment);
        assert_eq!(raw.entry, EntryAmount::Credit(Decimal::new(400, 0)));

        // Full write-off of the remainder
        let updated = engine
            .write_off_drawdown(created.drawdown.id, Decimal::new(600, 0), date, "bad debt")
            .await
            .unwrap();
        assert_eq!(updated.status, DrawdownStatus::WrittenOff);

        // Further write-offs rejected
        let err = engine
            .write_off_drawdown(created.drawdown.id, Decimal::new(1, 0), date, "bad debt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    async fn matched_repayment(
        engine: &PairingEngine,
        storage: &Arc<Storage>,
        amount: i64,
    ) -> (MainTransaction, MainTransaction) {
        let pay_bank = seed_typed_transaction(
            storage,
            "bank-1",
            TransactionType::DebtPay,
            Decimal::new(amount, 0),
        );
        let pay_debt = seed_typed_transaction(
            storage,
            "credit-1",
            TransactionType::DebtPay,
            Decimal::new(amount, 0),
        );
        engine
            .match_transfer(pay_bank.id, pay_debt.id)
            .await
            .unwrap();
        (
            storage.get_main_transaction(pay_bank.id).unwrap(),
            storage.get_main_transaction(pay_debt.id).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_apply_repayment_reduces_drawdown() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "credit-1", AccountType::CreditLine, "entity-1");
        let counterparty = seed_counterparty(&storage, "entity-1");

        let created = engine
            .create_drawdown(request("bank-1", "credit-1", 1000, counterparty.id))
            .await
            .unwrap();

        let (pay_bank, _) = matched_repayment(&engine, &storage, 300).await;
        let applied = engine
            .apply_repayment(pay_bank.id, created.drawdown.id)
            .await
            .unwrap();

        assert_eq!(applied.drawdown.remaining_balance, Decimal::new(700, 0));
        assert_eq!(applied.drawdown.status, DrawdownStatus::Active);
        assert!(applied.credit_memo.is_none());
        assert_eq!(
            applied.settlement.settles_transaction_id,
            Some(pay_bank.id)
        );

        // The payment now carries the drawdown reference
        let stamped = storage.get_main_transaction(pay_bank.id).unwrap();
        assert_eq!(stamped.drawdown_id, Some(created.drawdown.id));

        // Applying twice conflicts
        let err = engine
            .apply_repayment(pay_bank.id, created.drawdown.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_apply_repayment_overpayment_creates_memo() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "credit-1", AccountType::CreditLine, "entity-1");
        let counterparty = seed_counterparty(&storage, "entity-1");

        let created = engine
            .create_drawdown(request("bank-1", "credit-1", 1000, counterparty.id))
            .await
            .unwrap();

        let (pay_bank, _) = matched_repayment(&engine, &storage, 1200).await;
        let applied = engine
            .apply_repayment(pay_bank.id, created.drawdown.id)
            .await
            .unwrap();

        assert_eq!(applied.drawdown.remaining_balance, Decimal::ZERO);
        assert_eq!(applied.drawdown.status, DrawdownStatus::Settled);
        assert_eq!(applied.settlement.amount, Decimal::new(1000, 0));

        let memo = applied.credit_memo.unwrap();
        assert_eq!(memo.amount, Decimal::new(200, 0));
        assert_eq!(memo.credit_memo_of_drawdown_id, Some(created.drawdown.id));

        // A settled drawdown takes no further repayments
        let (second, _) = matched_repayment(&engine, &storage, 50).await;
        let err = engine
            .apply_repayment(second.id, created.drawdown.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unmatch_repayment_cascades() {
        let (engine, storage, _temp) = test_context();
        seed_account(&storage, "bank-1", AccountType::Bank, "entity-1");
        seed_account(&storage, "credit-1", AccountType::CreditLine, "entity-1");
        let counterparty = seed_counterparty(&storage, "entity-1");

        let created = engine
            .create_drawdown(request("bank-1", "credit-1", 1000, counterparty.id))
            .await
            .unwrap();

        let (pay_bank, pay_debt) = matched_repayment(&engine, &storage, 1200).await;
        let applied = engine
            .apply_repayment(pay_bank.id, created.drawdown.id)
            .await
            .unwrap();
        let settlement_raw_id = applied.settlement.raw_transaction_id.clone();
        let memo = applied.credit_memo.unwrap();

        engine.unmatch_transfer(pay_bank.id).await.unwrap();

        // Both sides unlinked, drawdown reference cleared
        let pay_bank = storage.get_main_transaction(pay_bank.id).unwrap();
        let pay_debt = storage.get_main_transaction(pay_debt.id).unwrap();
        assert!(pay_bank.matched_transaction_id.is_none());
        assert!(pay_debt.matched_transaction_id.is_none());
        assert!(pay_bank.drawdown_id.is_none());

        // Settlement and credit memo gone, raw rows included
        assert!(storage.get_main_transaction(applied.settlement.id).is_err());
        assert!(storage.get_raw_transaction(&settlement_raw_id).is_err());
        assert!(storage.get_main_transaction(memo.id).is_err());

        // Drawdown restored to its pre-repayment state
        let restored = storage.get_drawdown(created.drawdown.id).unwrap();
        assert_eq!(restored.remaining_balance, Decimal::new(1000, 0));
        assert_eq!(restored.status, DrawdownStatus::Active);
    }
}
