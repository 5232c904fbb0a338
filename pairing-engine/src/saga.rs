//! Compensating-rollback helper for multi-step writes
//!
//! Where the write set of an operation is known up front, a single
//! [`ledger_store::Batch`] is enough. The drawdown flows are different:
//! each step depends on the previous step's output, so they commit
//! step-by-step and register a compensation for each commit. On failure
//! the completed steps are compensated in reverse order.
//!
//! A compensation failure leaves the store inconsistent; it is never
//! masked — the saga logs each failed compensation loudly and surfaces
//! `Error::Integrity` with an explicit manual-cleanup signal.

use ledger_store::{Error, Result, Storage};
use serde_json::Value;
use tracing::{debug, error, info, warn};

type Compensation<'a> = Box<dyn FnOnce(&Storage) -> Result<()> + 'a>;

struct CompletedStep<'a> {
    name: &'static str,
    detail: Value,
    compensation: Compensation<'a>,
}

/// A multi-step write with reverse-order rollback
pub struct Saga<'a> {
    storage: &'a Storage,
    label: &'static str,
    completed: Vec<CompletedStep<'a>>,
}

impl<'a> Saga<'a> {
    /// Start a saga
    pub fn new(storage: &'a Storage, label: &'static str) -> Self {
        Self {
            storage,
            label,
            completed: Vec::new(),
        }
    }

    /// Execute one step; register its compensation on success
    ///
    /// On failure, every previously completed step is compensated in
    /// reverse order before the step's error is returned. If any
    /// compensation itself fails, `Error::Integrity` takes precedence.
    pub fn step<T>(
        &mut self,
        name: &'static str,
        detail: Value,
        action: impl FnOnce(&Storage) -> Result<T>,
        compensation: impl FnOnce(&Storage) -> Result<()> + 'a,
    ) -> Result<T> {
        debug!(saga = self.label, step = name, "Executing saga step");

        match action(self.storage) {
            Ok(value) => {
                self.completed.push(CompletedStep {
                    name,
                    detail,
                    compensation: Box::new(compensation),
                });
                Ok(value)
            }
            Err(err) => {
                error!(
                    saga = self.label,
                    step = name,
                    error = %err,
                    "Saga step failed, rolling back completed steps"
                );
                self.unwind()?;
                Err(err)
            }
        }
    }

    /// Abort after a mid-saga precondition failure
    ///
    /// Unwinds completed steps, then returns the caller's error (or
    /// `Error::Integrity` if the unwind itself failed).
    pub fn fail<T>(&mut self, err: Error) -> Result<T> {
        warn!(saga = self.label, error = %err, "Saga aborted, rolling back");
        self.unwind()?;
        Err(err)
    }

    /// Commit: discard compensations, the steps stand
    pub fn commit(mut self) {
        self.completed.clear();
        info!(saga = self.label, "Saga committed");
    }

    fn unwind(&mut self) -> Result<()> {
        let mut failed: Vec<&'static str> = Vec::new();

        // Reverse order of completion; keep going even if one fails so the
        // damage report is complete
        while let Some(step) = self.completed.pop() {
            match (step.compensation)(self.storage) {
                Ok(()) => {
                    debug!(saga = self.label, step = step.name, "Compensation applied");
                }
                Err(err) => {
                    error!(
                        saga = self.label,
                        step = step.name,
                        error = %err,
                        detail = %step.detail,
                        "Compensation FAILED - ledger may be inconsistent, manual cleanup required"
                    );
                    failed.push(step.name);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Integrity(format!(
                "rollback of '{}' incomplete; compensation failed for [{}]; manual cleanup required",
                self.label,
                failed.join(", ")
            )))
        }
    }
}

impl Drop for Saga<'_> {
    fn drop(&mut self) {
        // A saga that goes out of scope with registered compensations was
        // neither committed nor explicitly failed; unwind rather than leave
        // half-applied writes behind
        if !self.completed.is_empty() {
            warn!(
                saga = self.label,
                steps = self.completed.len(),
                "Saga dropped without commit, rolling back"
            );
            let _ = self.unwind();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledger_store::{AccountId, Config, Drawdown, DrawdownKind, DrawdownStatus};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_drawdown() -> Drawdown {
        Drawdown {
            id: Uuid::new_v4(),
            kind: DrawdownKind::Debt,
            account_id: AccountId::new("debt-1"),
            counterparty_id: Uuid::new_v4(),
            principal_amount: Decimal::new(1000, 0),
            remaining_balance: Decimal::new(1000, 0),
            written_off_amount: Decimal::ZERO,
            status: DrawdownStatus::Active,
            opened_on: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            due_date: None,
        }
    }

    #[test]
    fn test_committed_saga_keeps_writes() {
        let (storage, _temp) = test_storage();
        let drawdown = test_drawdown();
        let id = drawdown.id;

        let mut saga = Saga::new(&storage, "test");
        saga.step(
            "put_drawdown",
            json!({"id": id.to_string()}),
            |s| s.put_drawdown(&drawdown),
            move |s| s.delete_drawdown(id),
        )
        .unwrap();
        saga.commit();

        assert!(storage.get_drawdown(id).is_ok());
    }

    #[test]
    fn test_failed_step_unwinds_in_reverse_order() {
        let (storage, _temp) = test_storage();
        let first = test_drawdown();
        let second = test_drawdown();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let mut saga = Saga::new(&storage, "test");

        let o = order.clone();
        let first_id = first.id;
        saga.step(
            "first",
            json!(null),
            |s| s.put_drawdown(&first),
            move |s| {
                o.borrow_mut().push("first");
                s.delete_drawdown(first_id)
            },
        )
        .unwrap();

        let o = order.clone();
        let second_id = second.id;
        saga.step(
            "second",
            json!(null),
            |s| s.put_drawdown(&second),
            move |s| {
                o.borrow_mut().push("second");
                s.delete_drawdown(second_id)
            },
        )
        .unwrap();

        let err = saga
            .step(
                "third",
                json!(null),
                |_| -> Result<()> { Err(Error::Validation("boom".to_string())) },
                |_| Ok(()),
            )
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(*order.borrow(), vec!["second", "first"]);
        assert!(storage.get_drawdown(first_id).is_err());
        assert!(storage.get_drawdown(second_id).is_err());
    }

    #[test]
    fn test_fail_unwinds_completed_steps() {
        let (storage, _temp) = test_storage();
        let drawdown = test_drawdown();
        let id = drawdown.id;

        let mut saga = Saga::new(&storage, "test");
        saga.step(
            "put_drawdown",
            json!(null),
            |s| s.put_drawdown(&drawdown),
            move |s| s.delete_drawdown(id),
        )
        .unwrap();

        let err: Error = saga
            .fail::<()>(Error::Validation("precondition failed".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(storage.get_drawdown(id).is_err());
    }

    #[test]
    fn test_compensation_failure_surfaces_integrity() {
        let (storage, _temp) = test_storage();

        let mut saga = Saga::new(&storage, "test");
        saga.step(
            "step_with_bad_compensation",
            json!(null),
            |_| Ok(()),
            |_| Err(Error::Storage("disk gone".to_string())),
        )
        .unwrap();

        let err = saga
            .step(
                "failing_step",
                json!(null),
                |_| -> Result<()> { Err(Error::Validation("boom".to_string())) },
                |_| Ok(()),
            )
            .unwrap_err();

        // The integrity failure outranks the original validation error
        match err {
            Error::Integrity(msg) => {
                assert!(msg.contains("manual cleanup required"));
                assert!(msg.contains("step_with_bad_compensation"));
            }
            other => panic!("expected Integrity, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_saga_rolls_back() {
        let (storage, _temp) = test_storage();
        let drawdown = test_drawdown();
        let id = drawdown.id;

        {
            let mut saga = Saga::new(&storage, "test");
            saga.step(
                "put_drawdown",
                json!(null),
                |s| s.put_drawdown(&drawdown),
                move |s| s.delete_drawdown(id),
            )
            .unwrap();
            // Dropped without commit
        }

        assert!(storage.get_drawdown(id).is_err());
    }
}
