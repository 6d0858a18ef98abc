use std::collections::HashMap;
use std::sync::{Arc, Weak};

use ethers::types::Address;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<Address, Weak<AsyncMutex<()>>>>>;

/// One exclusive lock per account, created on demand.
///
/// The registry only holds weak references; an entry is dropped by the last
/// guard released while nobody else waits on the lock.
#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    registry: Registry,
}

/// Exclusive access to an account until dropped.
#[derive(Debug)]
pub struct AccountGuard {
    account: Address,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl AccountLocks {
    pub async fn lock(&self, account: Address) -> AccountGuard {
        let mutex = self.mutex(account);
        let guard = mutex.lock_owned().await;
        AccountGuard {
            account,
            guard: Some(guard),
            registry: self.registry.clone(),
        }
    }

    /// Number of accounts with a live lock.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutex(&self, account: Address) -> Arc<AsyncMutex<()>> {
        let mut registry = self.registry.lock();
        if let Some(mutex) = registry.get(&account).and_then(Weak::upgrade) {
            return mutex;
        }
        let mutex = Arc::new(AsyncMutex::new(()));
        registry.insert(account, Arc::downgrade(&mutex));
        mutex
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        drop(self.guard.take());
        let idle = registry
            .get(&self.account)
            .is_some_and(|mutex| mutex.strong_count() == 0);
        if idle {
            registry.remove(&self.account);
        }
    }
}
