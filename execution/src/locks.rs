//! Per-account mutual exclusion.
//!
//! Every balance-affecting operation holds an [`AccountGuard`] for its whole read-modify-commit
//! cycle. Waiters queue in FIFO order on a `tokio::sync::Mutex`, so plays on one account commit in
//! the order their locks were granted. A waiter that does not get the lock within the configured
//! timeout gives up without touching the account.

use raspa_types::casino::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout {
    pub account: AccountId,
    pub waited: Duration,
}

#[derive(Clone)]
pub struct AccountLocks {
    registry: Registry,
    timeout: Duration,
}

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn entry(&self, account: AccountId) -> Arc<AsyncMutex<()>> {
        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(poisoned) => {
                tracing::warn!("account lock registry poisoned; recovering");
                poisoned.into_inner()
            }
        };
        registry
            .entry(account)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait up to the configured timeout for exclusive access to `account`.
    pub async fn acquire(&self, account: AccountId) -> Result<AccountGuard, LockTimeout> {
        let lock = self.entry(account);
        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(AccountGuard {
                account,
                guard: Some(guard),
                registry: self.registry.clone(),
            }),
            Err(_) => {
                tracing::warn!(account_id = %account, timeout_ms = self.timeout.as_millis() as u64, "account lock timed out");
                Err(LockTimeout {
                    account,
                    waited: self.timeout,
                })
            }
        }
    }

    /// Number of accounts with a live or contended lock.
    pub fn active(&self) -> usize {
        match self.registry.lock() {
            Ok(registry) => registry.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Exclusive hold on one account. Releasing the last hold prunes the registry entry.
pub struct AccountGuard {
    account: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl AccountGuard {
    pub fn account(&self) -> AccountId {
        self.account
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(poisoned) => {
                tracing::warn!("account lock registry poisoned; recovering");
                poisoned.into_inner()
            }
        };
        // Waiters clone the entry under the registry lock, so a count of one means the map
        // holds the only reference.
        let idle = registry
            .get(&self.account)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            registry.remove(&self.account);
        }
    }
}
