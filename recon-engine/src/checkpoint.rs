//! Checkpoint service: the declared-truth boundary
//!
//! A checkpoint asserts what an account's balance was on a date, from a
//! bank statement import or a user declaration. Checkpoints anchor the
//! reconciliation scan; they are never implicitly deleted.

use chrono::{NaiveDate, Utc};
use ledger_store::{AccountBalance, AccountId, Checkpoint, Result, Storage};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Checkpoint declaration and balance recompute
pub struct CheckpointService {
    storage: Arc<Storage>,
}

impl CheckpointService {
    /// Create a new service
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Declare an account balance as of a date
    ///
    /// `import_batch_id` distinguishes statement imports from manual
    /// declarations. The system-derived balance at the same date is stored
    /// alongside for audit.
    pub async fn declare_checkpoint(
        &self,
        account_id: &AccountId,
        date: NaiveDate,
        declared_balance: Decimal,
        import_batch_id: Option<Uuid>,
    ) -> Result<Checkpoint> {
        let account = self.storage.get_account(account_id)?;

        let calculated = self.balance_through(account_id, date)?;
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            account_id: account.id,
            date,
            declared_balance,
            calculated_balance: Some(calculated),
            import_batch_id,
            created_at: Utc::now(),
        };

        let mut batch = self.storage.batch();
        batch.put_checkpoint(&checkpoint)?;
        batch.commit()?;

        info!(
            account_id = %account_id,
            date = %date,
            declared = %declared_balance,
            calculated = %calculated,
            source = %checkpoint.source(),
            "Checkpoint declared"
        );

        Ok(checkpoint)
    }

    /// Checkpoints for an account, oldest first
    pub async fn checkpoints(&self, account_id: &AccountId) -> Result<Vec<Checkpoint>> {
        self.storage.get_account(account_id)?;
        self.storage.checkpoints_for_account(account_id)
    }

    /// Remove a checkpoint (explicit admin action)
    ///
    /// Never called implicitly: removing a checkpoint breaks downstream
    /// reconciliation history.
    pub async fn remove_checkpoint(&self, checkpoint_id: Uuid) -> Result<()> {
        let checkpoint = self.storage.get_checkpoint(checkpoint_id)?;
        warn!(
            checkpoint_id = %checkpoint_id,
            account_id = %checkpoint.account_id,
            date = %checkpoint.date,
            "Removing checkpoint; downstream reconciliation history breaks at this date"
        );
        self.storage.delete_checkpoint(checkpoint_id)
    }

    /// Recompute the cached running balance from the full transaction log
    pub async fn recompute_balance(&self, account_id: &AccountId) -> Result<AccountBalance> {
        self.storage.get_account(account_id)?;

        let mut balance = Decimal::ZERO;
        let mut as_of = None;
        for item in self.storage.raw_transactions_for_account(account_id)? {
            balance += item.entry.signed();
            as_of = Some(item.date);
        }

        let cached = AccountBalance {
            account_id: account_id.clone(),
            balance,
            as_of: as_of.unwrap_or_else(|| Utc::now().date_naive()),
            computed_at: Utc::now(),
        };
        self.storage.put_balance(&cached)?;

        info!(account_id = %account_id, balance = %balance, "Balance recomputed");

        Ok(cached)
    }

    /// Net signed flow over all transactions dated at or before `through`
    fn balance_through(&self, account_id: &AccountId, through: NaiveDate) -> Result<Decimal> {
        let mut balance = Decimal::ZERO;
        for item in self
            .storage
            .raw_transactions_in_window(account_id, None, through)?
        {
            balance += item?.entry.signed();
        }
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledger_store::{
        Account, AccountType, Config, Currency, EntityId, EntryAmount, Error, MainTransaction,
        RawTransaction, TransactionId,
    };
    use tempfile::TempDir;

    fn test_service() -> (CheckpointService, Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Arc::new(Storage::open(&config).unwrap());
        (CheckpointService::new(storage.clone()), storage, temp_dir)
    }

    fn seed_account(storage: &Storage, id: &str) {
        let account = Account {
            id: AccountId::new(id),
            entity_id: EntityId::new("entity-1"),
            name: format!("Account {}", id),
            account_type: AccountType::Bank,
            currency: Currency::USD,
            credit_limit: None,
            active: true,
            created_at: Utc::now(),
        };
        storage.put_account(&account).unwrap();
    }

    fn seed_entry(storage: &Storage, account: &str, date: NaiveDate, entry: EntryAmount) {
        let account_id = AccountId::new(account);
        let raw = RawTransaction {
            id: TransactionId::generate(),
            account_id: account_id.clone(),
            date,
            sequence: storage.next_sequence(&account_id, date).unwrap(),
            description: "entry".to_string(),
            entry,
            declared_balance: None,
            is_balance_adjustment: false,
            checkpoint_id: None,
            notes: None,
            created_at: Utc::now(),
        };
        let main = MainTransaction::derived_from(&raw);
        let mut batch = storage.batch();
        batch.insert_transaction(&raw, &main).unwrap();
        batch.commit().unwrap();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_declare_records_calculated_balance() {
        let (service, storage, _temp) = test_service();
        seed_account(&storage, "acct-1");
        seed_entry(
            &storage,
            "acct-1",
            date(2025, 1, 5),
            EntryAmount::Credit(Decimal::new(500, 0)),
        );
        seed_entry(
            &storage,
            "acct-1",
            date(2025, 1, 8),
            EntryAmount::Debit(Decimal::new(200, 0)),
        );
        // After the checkpoint date, must not count
        seed_entry(
            &storage,
            "acct-1",
            date(2025, 2, 1),
            EntryAmount::Credit(Decimal::new(999, 0)),
        );

        let checkpoint = service
            .declare_checkpoint(
                &AccountId::new("acct-1"),
                date(2025, 1, 31),
                Decimal::new(300, 0),
                None,
            )
            .await
            .unwrap();

        assert_eq!(checkpoint.calculated_balance, Some(Decimal::new(300, 0)));
        assert_eq!(checkpoint.declared_balance, Decimal::new(300, 0));

        let stored = storage.get_checkpoint(checkpoint.id).unwrap();
        assert_eq!(stored.date, date(2025, 1, 31));
    }

    #[tokio::test]
    async fn test_declare_unknown_account_not_found() {
        let (service, _storage, _temp) = test_service();
        let err = service
            .declare_checkpoint(
                &AccountId::new("missing"),
                date(2025, 1, 1),
                Decimal::ZERO,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_recompute_balance_folds_full_log() {
        let (service, storage, _temp) = test_service();
        seed_account(&storage, "acct-1");
        seed_entry(
            &storage,
            "acct-1",
            date(2025, 1, 5),
            EntryAmount::Credit(Decimal::new(1000, 0)),
        );
        seed_entry(
            &storage,
            "acct-1",
            date(2025, 1, 7),
            EntryAmount::Debit(Decimal::new(350, 0)),
        );

        let balance = service
            .recompute_balance(&AccountId::new("acct-1"))
            .await
            .unwrap();
        assert_eq!(balance.balance, Decimal::new(650, 0));
        assert_eq!(balance.as_of, date(2025, 1, 7));

        // The cache row is persisted
        let cached = storage
            .get_balance(&AccountId::new("acct-1"))
            .unwrap()
            .unwrap();
        assert_eq!(cached.balance, Decimal::new(650, 0));
    }

    #[tokio::test]
    async fn test_remove_checkpoint() {
        let (service, storage, _temp) = test_service();
        seed_account(&storage, "acct-1");

        let checkpoint = service
            .declare_checkpoint(
                &AccountId::new("acct-1"),
                date(2025, 3, 31),
                Decimal::new(100, 0),
                Some(Uuid::new_v4()),
            )
            .await
            .unwrap();

        service.remove_checkpoint(checkpoint.id).await.unwrap();
        assert!(storage.get_checkpoint(checkpoint.id).is_err());
        assert!(storage
            .latest_checkpoint(&AccountId::new("acct-1"))
            .unwrap()
            .is_none());
    }
}
