//! Per-account mutual exclusion.
//!
//! Every state-changing operation holds its account's lock from the first
//! read to the commit. Two-account operations take both locks in ascending
//! id order.

use idle_core::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries beyond this are pruned when unused.
const PRUNE_THRESHOLD: usize = 1_024;

pub type AccountGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct AccountLocks {
    table: Mutex<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: AccountId) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table.len() >= PRUNE_THRESHOLD {
            // Only the table holds an idle entry.
            table.retain(|_, m| Arc::strong_count(m) > 1);
        }
        Arc::clone(table.entry(id).or_default())
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: AccountId) -> AccountGuard {
        self.handle(id).lock_owned().await
    }

    /// Lock two distinct accounts, lower id first.
    pub async fn lock_pair(&self, a: AccountId, b: AccountId) -> (AccountGuard, AccountGuard) {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let g1 = self.lock(first).await;
        let g2 = self.lock(second).await;
        (g1, g2)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_account_is_exclusive() {
        let locks = Arc::new(AccountLocks::new());
        let g = locks.lock(AccountId(1)).await;
        let l2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = l2.lock(AccountId(1)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(g);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_accounts_do_not_block() {
        let locks = AccountLocks::new();
        let _a = locks.lock(AccountId(1)).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.lock(AccountId(2)))
            .await
            .expect("second account should lock immediately");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn opposite_pairs_do_not_deadlock() {
        let locks = Arc::new(AccountLocks::new());
        let mut tasks = Vec::new();
        for i in 0..20 {
            let l = Arc::clone(&locks);
            tasks.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                let _g = l.lock_pair(AccountId(a), AccountId(b)).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = async {
            for t in tasks {
                t.await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("pair locking deadlocked");
    }
}
