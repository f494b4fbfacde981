//! Per-record locks that serialize ledger operations.
//!
//! Every operation acquires all the keys it touches in a single call. Keys
//! are always taken in ascending order, so two operations can never wait on
//! each other in a cycle. Submissions have no key of their own: they are
//! guarded by the key of the task they belong to.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use earnzy_common::{Email, TaskId, WithdrawalId};

use crate::config::LockConfig;

/// A lockable record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Account(Email),
    Task(TaskId),
    Withdrawal(WithdrawalId),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Account(email) => write!(f, "account:{email}"),
            LockKey::Task(id) => write!(f, "task:{id}"),
            LockKey::Withdrawal(id) => write!(f, "withdrawal:{id}"),
        }
    }
}

/// Held locks. Dropping the set releases every key.
pub struct LockSet {
    keys: BTreeSet<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// Check if `key` is held by this set.
    pub fn covers(&self, key: &LockKey) -> bool {
        self.keys.contains(key)
    }

    /// Check if every key in `keys` is held by this set.
    pub fn covers_all<'a>(&self, keys: impl IntoIterator<Item = &'a LockKey>) -> bool {
        keys.into_iter().all(|k| self.covers(k))
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Table of per-key async mutexes.
pub struct LockManager {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    config: LockConfig,
}

impl LockManager {
    /// Create a new lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: DashMap::new(),
            config,
        }
    }

    /// Acquire every key, in ascending order. Duplicates are ignored.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let keys: BTreeSet<LockKey> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(keys.len());

        for key in &keys {
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }

        debug!(keys = keys.len(), "Locks acquired");

        LockSet {
            keys,
            _guards: guards,
        }
    }

    /// Number of keys currently tracked (held or idle).
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }

    /// Drop table entries nobody holds or waits on. Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Run cleanup loop to prune idle keys.
    pub async fn run_cleanup_loop(&self) {
        loop {
            tokio::time::sleep(self.config.prune_interval).await;
            let pruned = self.prune_idle();
            if pruned > 0 {
                debug!(pruned, "Idle lock keys pruned");
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
