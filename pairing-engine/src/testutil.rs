//! Shared fixtures for the engine tests

use crate::pairing::PairingEngine;
use chrono::{NaiveDate, Utc};
use ledger_store::{
    Account, AccountId, AccountType, Config, Counterparty, Currency, EntityId, EntryAmount,
    LockRegistry, MainTransaction, RawTransaction, Storage, TransactionId, TransactionType,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub fn test_context() -> (PairingEngine, Arc<Storage>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    let storage = Arc::new(Storage::open(&config).unwrap());
    let engine = PairingEngine::new(storage.clone(), Arc::new(LockRegistry::new()));
    (engine, storage, temp_dir)
}

pub fn seed_account(storage: &Storage, id: &str, account_type: AccountType, entity: &str) {
    let account = Account {
        id: AccountId::new(id),
        entity_id: EntityId::new(entity),
        name: format!("Account {}", id),
        account_type,
        currency: Currency::USD,
        credit_limit: if account_type.is_debt() {
            Some(Decimal::new(10_000_000, 0))
        } else {
            None
        },
        active: true,
        created_at: Utc::now(),
    };
    storage.put_account(&account).unwrap();
}

pub fn seed_counterparty(storage: &Storage, entity: &str) -> Counterparty {
    let counterparty = Counterparty {
        id: Uuid::new_v4(),
        entity_id: EntityId::new(entity),
        name: "Acme Partners".to_string(),
    };
    storage.put_counterparty(&counterparty).unwrap();
    counterparty
}

/// Insert a raw transaction with a main row of the given type
pub fn seed_typed_transaction(
    storage: &Storage,
    account: &str,
    transaction_type: TransactionType,
    amount: Decimal,
) -> MainTransaction {
    let account_id = AccountId::new(account);
    let date = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
    let entry = match transaction_type {
        TransactionType::TransferIn | TransactionType::LoanCollect => EntryAmount::Credit(amount),
        _ => EntryAmount::Debit(amount),
    };

    let raw = RawTransaction {
        id: TransactionId::generate(),
        account_id: account_id.clone(),
        date,
        sequence: storage.next_sequence(&account_id, date).unwrap(),
        description: format!("{} entry", transaction_type),
        entry,
        declared_balance: None,
        is_balance_adjustment: false,
        checkpoint_id: None,
        notes: None,
        created_at: Utc::now(),
    };
    let mut main = MainTransaction::derived_from(&raw);
    main.transaction_type = transaction_type;

    let mut batch = storage.batch();
    batch.insert_transaction(&raw, &main).unwrap();
    batch.commit().unwrap();
    main
}
