//! Per-account locks
//!
//! Serializes read-validate-write sequences on one account. Multi-account
//! operations lock in ascending account-number order, so two transfers
//! in opposite directions cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct AccountLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct AccountGuard {
    accounts: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuard {
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, account: &str) -> Arc<AsyncMutex<()>> {
        self.slots()
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock one account
    pub async fn lock(&self, account: &str) -> AccountGuard {
        self.lock_all(&[account]).await
    }

    /// Lock several accounts in a fixed global order (duplicates collapse)
    pub async fn lock_all(&self, accounts: &[&str]) -> AccountGuard {
        let mut ordered: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for account in &ordered {
            guards.push(self.slot(account).lock_owned().await);
        }

        AccountGuard {
            accounts: ordered,
            _guards: guards,
        }
    }

    /// Drop slots nobody holds or waits on
    pub fn prune(&self) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_all_orders_and_dedups() {
        let locks = AccountLocks::new();
        let guard = locks.lock_all(&["b", "a", "b"]).await;
        assert_eq!(guard.accounts(), &["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_opposite_order_does_not_deadlock() {
        let locks = Arc::new(AccountLocks::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let pair = if i % 2 == 0 { ["x", "y"] } else { ["y", "x"] };
                let _g = locks.lock_all(&pair).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = futures_join(handles);
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("lock ordering deadlocked");
    }

    async fn futures_join(handles: Vec<tokio::task::JoinHandle<()>>) {
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_prune_releases_idle_slots() {
        let locks = AccountLocks::new();
        {
            let _g = locks.lock("a").await;
            assert_eq!(locks.prune(), 0);
        }
        assert_eq!(locks.prune(), 1);
    }
}
