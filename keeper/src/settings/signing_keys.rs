use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

/// Keys the block webhook may sign deliveries with.
///
/// A rotation accepts both keys until the grace period of the old one ends,
/// so deliveries signed before the switch still verify.
#[derive(Clone, Default)]
pub struct SigningKeys {
    keys: Arc<RwLock<HashSet<String>>>,
}

impl SigningKeys {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: Arc::new(RwLock::new(keys.into_iter().collect())),
        }
    }

    pub fn add(&self, key: impl Into<String>) {
        self.keys.write().insert(key.into());
    }

    pub fn retire(&self, key: &str) -> bool {
        self.keys.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Accepts `new` right away and retires `old` once `grace` has passed.
    pub fn rotate(&self, new: impl Into<String>, old: impl Into<String>, grace: Duration) -> JoinHandle<()> {
        self.add(new);
        let keys = self.clone();
        let old = old.into();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if keys.retire(&old) {
                info!("Retired webhook signing key");
            }
        })
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("len", &self.len())
            .finish()
    }
}
