//! Per-key async locks for read-validate-write sections
//!
//! Match/unmatch and the drawdown flows must re-check their preconditions
//! at write time, not only at read time. Engines take the locks for every
//! row they will mutate, re-read state under them, and only then commit —
//! a second concurrent writer observes the first writer's commit and fails
//! its own precondition check instead of overwriting.
//!
//! Keys share one namespace (raw transaction ids, account ids, drawdown
//! ids); multi-key acquisition is sorted, so lock order is total and two
//! operations can never deadlock on each other.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key mutexes
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Lock a single key
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Lock several keys, in sorted order
    pub async fn lock_all(&self, keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&String> = keys.iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }
}
