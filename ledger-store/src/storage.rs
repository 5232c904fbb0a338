//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Accounts (key: account_id)
//! - `counterparties` - Business partners (key: counterparty_id)
//! - `raw_txns` - Source-of-truth ledger entries (key: transaction_id)
//! - `main_txns` - Categorized/split rows (key: main_id)
//! - `checkpoints` - Declared balances (key: checkpoint_id)
//! - `drawdowns` - Debt/loan principal records (key: drawdown_id)
//! - `balances` - Cached running balances (key: account_id)
//! - `indices` - Secondary indices for ordered lookups
//!
//! Index keys are order-preserving big-endian composites, so a prefix scan
//! yields (date, sequence) order without sorting. Every multi-row mutation
//! goes through [`Batch`], which maintains the indices alongside the
//! primary rows and commits atomically.

use crate::{
    error::{Error, Result},
    types::{
        Account, AccountBalance, AccountId, Checkpoint, Counterparty, Drawdown, MainTransaction,
        RawTransaction, TransactionId,
    },
    Config,
};
use chrono::{Datelike, NaiveDate};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction as ScanDirection,
    IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_COUNTERPARTIES: &str = "counterparties";
const CF_RAW_TXNS: &str = "raw_txns";
const CF_MAIN_TXNS: &str = "main_txns";
const CF_CHECKPOINTS: &str = "checkpoints";
const CF_DRAWDOWNS: &str = "drawdowns";
const CF_BALANCES: &str = "balances";
const CF_INDICES: &str = "indices";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_COUNTERPARTIES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_RAW_TXNS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_MAIN_TXNS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_DRAWDOWNS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Put account
    pub fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.db
            .put_cf(&cf, account.id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Get account by ID
    pub fn get_account(&self, id: &AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(&cf, id.as_str().as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Soft-deactivate an account
    ///
    /// Accounts with transactions are never deleted; this is the only
    /// removal path.
    pub fn deactivate_account(&self, id: &AccountId) -> Result<()> {
        let mut account = self.get_account(id)?;
        account.active = false;
        self.put_account(&account)?;

        tracing::info!(account_id = %id, "Account deactivated");
        Ok(())
    }

    /// Whether any raw transaction exists for the account
    pub fn account_has_transactions(&self, id: &AccountId) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_raw_by_account(id);
        let mut iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, ScanDirection::Forward));

        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(&prefix))
            }
            None => Ok(false),
        }
    }

    // Counterparty operations

    /// Put counterparty
    pub fn put_counterparty(&self, counterparty: &Counterparty) -> Result<()> {
        let cf = self.cf_handle(CF_COUNTERPARTIES)?;
        let value = bincode::serialize(counterparty)?;
        self.db.put_cf(&cf, counterparty.id.as_bytes(), &value)?;
        Ok(())
    }

    /// Get counterparty by ID
    pub fn get_counterparty(&self, id: Uuid) -> Result<Counterparty> {
        let cf = self.cf_handle(CF_COUNTERPARTIES)?;
        let value = self
            .db
            .get_cf(&cf, id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("counterparty {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    // Raw transaction operations

    /// Get raw transaction by ID
    pub fn get_raw_transaction(&self, id: &TransactionId) -> Result<RawTransaction> {
        let cf = self.cf_handle(CF_RAW_TXNS)?;
        let value = self
            .db
            .get_cf(&cf, id.as_str().as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("raw transaction {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Raw transactions for an account with date in `(after, through]`,
    /// streamed in (date, sequence) order
    ///
    /// The (date, sequence) order is a correctness requirement for the
    /// reconciliation scan, not a convenience; it falls out of the index
    /// key encoding.
    pub fn raw_transactions_in_window(
        &self,
        account_id: &AccountId,
        after: Option<NaiveDate>,
        through: NaiveDate,
    ) -> Result<impl Iterator<Item = Result<RawTransaction>> + '_> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_raw_by_account(account_id);

        let mut start = prefix.clone();
        if let Some(after) = after {
            let from = after
                .succ_opt()
                .ok_or_else(|| Error::Validation("window start date overflows".to_string()))?;
            start.extend_from_slice(&date_ordinal(from).to_be_bytes());
        }

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, ScanDirection::Forward));
        let through_ordinal = date_ordinal(through);
        let prefix_len = prefix.len();

        Ok(iter
            .map(|item| item.map_err(Error::from))
            .take_while(move |item| match item {
                Ok((key, _)) => {
                    key.starts_with(&prefix)
                        && key.len() >= prefix_len + 4
                        && u32::from_be_bytes(
                            key[prefix_len..prefix_len + 4]
                                .try_into()
                                .expect("slice is 4 bytes"),
                        ) <= through_ordinal
                }
                Err(_) => true,
            })
            .map(move |item| {
                let (_, value) = item?;
                let id = transaction_id_from_bytes(&value)?;
                self.get_raw_transaction(&id)
            }))
    }

    /// All raw transactions for an account in (date, sequence) order
    pub fn raw_transactions_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<RawTransaction>> {
        self.raw_transactions_in_window(account_id, None, NaiveDate::MAX)?
            .collect()
    }

    /// Next same-day sequence number for an account
    pub fn next_sequence(&self, account_id: &AccountId, date: NaiveDate) -> Result<u32> {
        let cf = self.cf_handle(CF_INDICES)?;
        let mut prefix = index_prefix_raw_by_account(account_id);
        prefix.extend_from_slice(&date_ordinal(date).to_be_bytes());

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, ScanDirection::Forward));

        let mut max_seq = 0u32;
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() >= prefix.len() + 4 {
                let seq = u32::from_be_bytes(
                    key[prefix.len()..prefix.len() + 4]
                        .try_into()
                        .expect("slice is 4 bytes"),
                );
                max_seq = max_seq.max(seq);
            }
        }

        Ok(max_seq + 1)
    }

    // Main transaction operations

    /// Get main transaction by ID
    pub fn get_main_transaction(&self, id: Uuid) -> Result<MainTransaction> {
        let cf = self.cf_handle(CF_MAIN_TXNS)?;
        let value = self
            .db
            .get_cf(&cf, id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("main transaction {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Main transactions derived from one raw transaction, in split order
    pub fn main_transactions_for_raw(
        &self,
        raw_id: &TransactionId,
    ) -> Result<Vec<MainTransaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_main_by_raw(raw_id);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, ScanDirection::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = Uuid::from_slice(&value)
                .map_err(|e| Error::Storage(format!("bad main id in index: {}", e)))?;
            rows.push(self.get_main_transaction(id)?);
        }

        Ok(rows)
    }

    /// Main transactions referencing a drawdown (settlements, credit memos,
    /// write-offs, pair sides)
    pub fn main_transactions_for_drawdown(
        &self,
        drawdown_id: Uuid,
    ) -> Result<Vec<MainTransaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_main_by_drawdown(drawdown_id);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, ScanDirection::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = Uuid::from_slice(&value)
                .map_err(|e| Error::Storage(format!("bad main id in index: {}", e)))?;
            let main = self.get_main_transaction(id)?;
            if main.drawdown_links().contains(&drawdown_id) {
                rows.push(main);
            }
        }

        Ok(rows)
    }

    // Checkpoint operations

    /// Get checkpoint by ID
    pub fn get_checkpoint(&self, id: Uuid) -> Result<Checkpoint> {
        let cf = self.cf_handle(CF_CHECKPOINTS)?;
        let value = self
            .db
            .get_cf(&cf, id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("checkpoint {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Checkpoints for an account in date order
    pub fn checkpoints_for_account(&self, account_id: &AccountId) -> Result<Vec<Checkpoint>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = index_prefix_checkpoint_by_account(account_id);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, ScanDirection::Forward));

        let mut checkpoints = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let id = Uuid::from_slice(&value)
                .map_err(|e| Error::Storage(format!("bad checkpoint id in index: {}", e)))?;
            checkpoints.push(self.get_checkpoint(id)?);
        }

        Ok(checkpoints)
    }

    /// Latest checkpoint for an account, if any
    pub fn latest_checkpoint(&self, account_id: &AccountId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints_for_account(account_id)?.pop())
    }

    /// Most recent checkpoint strictly before `before`, excluding the
    /// target itself
    pub fn previous_checkpoint(
        &self,
        account_id: &AccountId,
        before: NaiveDate,
        excluding: Uuid,
    ) -> Result<Option<Checkpoint>> {
        let mut previous = None;
        for checkpoint in self.checkpoints_for_account(account_id)? {
            if checkpoint.date < before && checkpoint.id != excluding {
                previous = Some(checkpoint);
            }
        }
        Ok(previous)
    }

    /// Delete a checkpoint (explicit admin action)
    ///
    /// Breaks downstream reconciliation history; callers log the intent.
    pub fn delete_checkpoint(&self, id: Uuid) -> Result<()> {
        let checkpoint = self.get_checkpoint(id)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&self.cf_handle(CF_CHECKPOINTS)?, id.as_bytes());
        batch.delete_cf(
            &self.cf_handle(CF_INDICES)?,
            index_key_checkpoint_by_account(&checkpoint.account_id, checkpoint.date, id),
        );
        self.db.write(batch)?;

        Ok(())
    }

    // Drawdown operations

    /// Put drawdown
    pub fn put_drawdown(&self, drawdown: &Drawdown) -> Result<()> {
        let cf = self.cf_handle(CF_DRAWDOWNS)?;
        let value = bincode::serialize(drawdown)?;
        self.db.put_cf(&cf, drawdown.id.as_bytes(), &value)?;
        Ok(())
    }

    /// Get drawdown by ID
    pub fn get_drawdown(&self, id: Uuid) -> Result<Drawdown> {
        let cf = self.cf_handle(CF_DRAWDOWNS)?;
        let value = self
            .db
            .get_cf(&cf, id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("drawdown {}", id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Delete drawdown (saga compensation only; drawdowns with payment
    /// history are never hard-deleted)
    pub fn delete_drawdown(&self, id: Uuid) -> Result<()> {
        let cf = self.cf_handle(CF_DRAWDOWNS)?;
        self.db.delete_cf(&cf, id.as_bytes())?;
        Ok(())
    }

    // Balance cache operations

    /// Put cached balance
    pub fn put_balance(&self, balance: &AccountBalance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.db
            .put_cf(&cf, balance.account_id.as_str().as_bytes(), &value)?;
        Ok(())
    }

    /// Get cached balance, if one has been computed
    pub fn get_balance(&self, account_id: &AccountId) -> Result<Option<AccountBalance>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(&cf, account_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Batch operations (atomic)

    /// Start an atomic write batch
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            storage: self,
            inner: WriteBatch::default(),
        }
    }
}

/// Atomic multi-row write
///
/// Maintains secondary indices alongside the primary rows; nothing is
/// visible to readers until [`Batch::commit`].
pub struct Batch<'a> {
    storage: &'a Storage,
    inner: WriteBatch,
}

impl Batch<'_> {
    /// Put a raw transaction with its account/date index entry
    pub fn put_raw_transaction(&mut self, raw: &RawTransaction) -> Result<()> {
        let value = bincode::serialize(raw)?;
        self.inner.put_cf(
            &self.storage.cf_handle(CF_RAW_TXNS)?,
            raw.id.as_str().as_bytes(),
            &value,
        );
        self.inner.put_cf(
            &self.storage.cf_handle(CF_INDICES)?,
            index_key_raw_by_account(&raw.account_id, raw.date, raw.sequence),
            raw.id.as_str().as_bytes(),
        );
        Ok(())
    }

    /// Delete a raw transaction and its index entry
    pub fn delete_raw_transaction(&mut self, raw: &RawTransaction) -> Result<()> {
        self.inner.delete_cf(
            &self.storage.cf_handle(CF_RAW_TXNS)?,
            raw.id.as_str().as_bytes(),
        );
        self.inner.delete_cf(
            &self.storage.cf_handle(CF_INDICES)?,
            index_key_raw_by_account(&raw.account_id, raw.date, raw.sequence),
        );
        Ok(())
    }

    /// Put a main transaction with its raw/split and drawdown index entries
    pub fn put_main_transaction(&mut self, main: &MainTransaction) -> Result<()> {
        let value = bincode::serialize(main)?;
        self.inner.put_cf(
            &self.storage.cf_handle(CF_MAIN_TXNS)?,
            main.id.as_bytes(),
            &value,
        );
        self.inner.put_cf(
            &self.storage.cf_handle(CF_INDICES)?,
            index_key_main_by_raw(&main.raw_transaction_id, main.split_sequence),
            main.id.as_bytes(),
        );
        for drawdown_id in main.drawdown_links() {
            self.inner.put_cf(
                &self.storage.cf_handle(CF_INDICES)?,
                index_key_main_by_drawdown(drawdown_id, main.id),
                main.id.as_bytes(),
            );
        }
        Ok(())
    }

    /// Delete a main transaction and its index entries
    pub fn delete_main_transaction(&mut self, main: &MainTransaction) -> Result<()> {
        self.inner
            .delete_cf(&self.storage.cf_handle(CF_MAIN_TXNS)?, main.id.as_bytes());
        self.inner.delete_cf(
            &self.storage.cf_handle(CF_INDICES)?,
            index_key_main_by_raw(&main.raw_transaction_id, main.split_sequence),
        );
        for drawdown_id in main.drawdown_links() {
            self.inner.delete_cf(
                &self.storage.cf_handle(CF_INDICES)?,
                index_key_main_by_drawdown(drawdown_id, main.id),
            );
        }
        Ok(())
    }

    /// Update a main transaction in place, fixing up index entries that the
    /// new version no longer carries
    pub fn update_main_transaction(
        &mut self,
        old: &MainTransaction,
        new: &MainTransaction,
    ) -> Result<()> {
        debug_assert_eq!(old.id, new.id);

        if old.split_sequence != new.split_sequence {
            self.inner.delete_cf(
                &self.storage.cf_handle(CF_INDICES)?,
                index_key_main_by_raw(&old.raw_transaction_id, old.split_sequence),
            );
        }
        let new_links = new.drawdown_links();
        for stale in old
            .drawdown_links()
            .into_iter()
            .filter(|id| !new_links.contains(id))
        {
            self.inner.delete_cf(
                &self.storage.cf_handle(CF_INDICES)?,
                index_key_main_by_drawdown(stale, old.id),
            );
        }

        self.put_main_transaction(new)
    }

    /// Insert a raw transaction together with its main transaction
    ///
    /// Every raw insert goes through here (or supplies the derived rows
    /// itself in the same batch), keeping the "every raw transaction has at
    /// least one main transaction" invariant in application code.
    pub fn insert_transaction(
        &mut self,
        raw: &RawTransaction,
        main: &MainTransaction,
    ) -> Result<()> {
        self.put_raw_transaction(raw)?;
        self.put_main_transaction(main)
    }

    /// Put a checkpoint with its account/date index entry
    pub fn put_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let value = bincode::serialize(checkpoint)?;
        self.inner.put_cf(
            &self.storage.cf_handle(CF_CHECKPOINTS)?,
            checkpoint.id.as_bytes(),
            &value,
        );
        self.inner.put_cf(
            &self.storage.cf_handle(CF_INDICES)?,
            index_key_checkpoint_by_account(&checkpoint.account_id, checkpoint.date, checkpoint.id),
            checkpoint.id.as_bytes(),
        );
        Ok(())
    }

    /// Put a drawdown
    pub fn put_drawdown(&mut self, drawdown: &Drawdown) -> Result<()> {
        let value = bincode::serialize(drawdown)?;
        self.inner.put_cf(
            &self.storage.cf_handle(CF_DRAWDOWNS)?,
            drawdown.id.as_bytes(),
            &value,
        );
        Ok(())
    }

    /// Atomic commit
    pub fn commit(self) -> Result<()> {
        self.storage.db.write(self.inner)?;
        Ok(())
    }
}

// Index key helpers

/// Days-from-CE ordinal; lexicographic big-endian order matches date order
fn date_ordinal(date: NaiveDate) -> u32 {
    // Ledger dates are CE; clamp defensively rather than wrap
    date.num_days_from_ce().max(0) as u32
}

fn index_prefix_raw_by_account(account_id: &AccountId) -> Vec<u8> {
    let mut key = b"r|".to_vec();
    key.extend_from_slice(account_id.as_str().as_bytes());
    key.push(0);
    key
}

fn index_key_raw_by_account(account_id: &AccountId, date: NaiveDate, sequence: u32) -> Vec<u8> {
    let mut key = index_prefix_raw_by_account(account_id);
    key.extend_from_slice(&date_ordinal(date).to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn index_prefix_main_by_raw(raw_id: &TransactionId) -> Vec<u8> {
    let mut key = b"m|".to_vec();
    key.extend_from_slice(raw_id.as_str().as_bytes());
    key.push(0);
    key
}

fn index_key_main_by_raw(raw_id: &TransactionId, split_sequence: u32) -> Vec<u8> {
    let mut key = index_prefix_main_by_raw(raw_id);
    key.extend_from_slice(&split_sequence.to_be_bytes());
    key
}

fn index_prefix_checkpoint_by_account(account_id: &AccountId) -> Vec<u8> {
    let mut key = b"c|".to_vec();
    key.extend_from_slice(account_id.as_str().as_bytes());
    key.push(0);
    key
}

fn index_key_checkpoint_by_account(
    account_id: &AccountId,
    date: NaiveDate,
    checkpoint_id: Uuid,
) -> Vec<u8> {
    let mut key = index_prefix_checkpoint_by_account(account_id);
    key.extend_from_slice(&date_ordinal(date).to_be_bytes());
    key.extend_from_slice(checkpoint_id.as_bytes());
    key
}

fn index_prefix_main_by_drawdown(drawdown_id: Uuid) -> Vec<u8> {
    let mut key = b"d|".to_vec();
    key.extend_from_slice(drawdown_id.as_bytes());
    key
}

fn index_key_main_by_drawdown(drawdown_id: Uuid, main_id: Uuid) -> Vec<u8> {
    let mut key = index_prefix_main_by_drawdown(drawdown_id);
    key.extend_from_slice(main_id.as_bytes());
    key
}

fn transaction_id_from_bytes(bytes: &[u8]) -> Result<TransactionId> {
    let s = std::str::from_utf8(bytes)
        .map_err(|e| Error::Storage(format!("bad transaction id in index: {}", e)))?;
    Ok(TransactionId::new(s))
}
