//! Error types for the ledger
//!
//! One taxonomy shared by the store and every engine: validation,
//! not-found, and conflict errors are recoverable rejections; integrity
//! errors mean a multi-step write partially failed and the store may need
//! manual cleanup.

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or business-rule-violating input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced entity/account/transaction/checkpoint absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent-modification race (e.g. double-match)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Partial multi-step write; compensation required or attempted
    #[error("Integrity failure: {0}")]
    Integrity(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
