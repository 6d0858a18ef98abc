use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn, Span};

use super::{NonceError, NonceKey, NonceSource};

const NONCE_CACHE_CAPACITY: u64 = 8192;

type SharedFetch = Shared<BoxFuture<'static, Result<u64, NonceError>>>;

/// Snapshot of the nonce state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceInfo {
    pub delta: u64,
    pub nonce: Option<u64>,
}

#[derive(Default)]
struct NonceEntry {
    /// Nonces handed out since the in-flight fetch started.
    delta: u64,
    /// In-flight fetch shared by every concurrent caller, tagged with its generation.
    pending: Option<(u64, SharedFetch)>,
}

struct NonceManagerState {
    entries: Mutex<HashMap<NonceKey, NonceEntry>>,
    nonces: Cache<NonceKey, u64>,
    generation: AtomicU64,
}

impl NonceManagerState {
    fn new() -> Self {
        let nonces = Cache::builder()
            .max_capacity(NONCE_CACHE_CAPACITY)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            entries: Mutex::new(HashMap::new()),
            nonces,
            generation: AtomicU64::new(0),
        }
    }

    /// Resolves a fetch for `key`, guarding against an RPC that lags behind
    /// nonces already handed out.
    ///
    /// Once resolved, the entry of the fetch is cleared unless a hard reset
    /// replaced it. The highest nonce reserved on it is cached first, so a
    /// caller arriving before those nonces are persisted does not reuse them.
    fn settle(&self, key: &NonceKey, generation: u64, fetched: u64) -> u64 {
        let mut entries = self.entries.lock();
        let previous = self.nonces.get(key).unwrap_or(0);
        let base = if previous > 0 && fetched <= previous {
            previous + 1
        } else {
            self.nonces.invalidate(key);
            fetched
        };
        let current = entries
            .get(key)
            .and_then(|entry| entry.pending.as_ref().map(|(pending, _)| (*pending, entry.delta)));
        if let Some((pending, delta)) = current {
            if pending == generation {
                if delta > 0 {
                    self.nonces.insert(*key, base + delta - 1);
                }
                entries.remove(key);
            }
        }
        base
    }

    /// Drops the entry of a failed fetch, unless a hard reset replaced it.
    fn abandon(&self, key: &NonceKey, generation: u64) {
        let mut entries = self.entries.lock();
        let current = entries
            .get(key)
            .and_then(|entry| entry.pending.as_ref())
            .map(|(pending, _)| *pending);
        if current == Some(generation) {
            entries.remove(key);
        }
    }

    /// Drops the cached nonce when it is the one that failed to persist.
    fn forget(&self, key: &NonceKey, nonce: u64) {
        let _entries = self.entries.lock();
        if self.nonces.get(key) == Some(nonce) {
            self.nonces.invalidate(key);
        }
    }

    fn remember(&self, key: NonceKey, nonce: u64) {
        let _entries = self.entries.lock();
        let cached = self.nonces.get(&key);
        if cached.map_or(true, |cached| cached < nonce) {
            self.nonces.insert(key, nonce);
        }
    }
}

/// Hands out transaction nonces per signer and chain.
///
/// Concurrent callers share a single fetch from the nonce source and are told
/// apart by a delta that is incremented synchronously on reservation, so no two
/// callers receive the same nonce.
#[derive(Clone)]
pub struct NonceManager {
    source: Arc<dyn NonceSource>,
    state: Arc<NonceManagerState>,
}

impl NonceManager {
    pub fn new(source: Arc<dyn NonceSource>) -> Self {
        Self {
            source,
            state: Arc::new(NonceManagerState::new()),
        }
    }

    #[instrument(name = "nonce.consume", skip(self), fields(%key, delta, nonce))]
    pub async fn consume(&self, key: NonceKey) -> Result<u64, NonceError> {
        let (delta, fetch) = self.reserve(key, true);
        Span::current().record("delta", delta);
        let base = fetch.await?;
        let nonce = base + delta;
        if let Err(err) = self.source.set(&key, nonce).await {
            self.state.forget(&key, nonce);
            return Err(err);
        }
        self.state.remember(key, nonce);
        Span::current().record("nonce", nonce);
        debug!(nonce, delta, "Consumed nonce");
        Ok(nonce)
    }

    /// The nonce the next `consume` would return, without reserving it.
    #[instrument(name = "nonce.get", skip(self), fields(%key, delta, nonce))]
    pub async fn get(&self, key: NonceKey) -> Result<u64, NonceError> {
        let (delta, fetch) = self.reserve(key, false);
        Span::current().record("delta", delta);
        let nonce = fetch.await? + delta;
        Span::current().record("nonce", nonce);
        Ok(nonce)
    }

    /// Discards everything known about `key`; the next call reads the source again.
    #[instrument(name = "nonce.hard_reset", skip(self), fields(%key))]
    pub fn hard_reset(&self, key: NonceKey) {
        let removed = self.state.entries.lock().remove(&key);
        self.state.nonces.invalidate(&key);
        warn!(
            delta = removed.map(|entry| entry.delta).unwrap_or_default(),
            "Hard reset nonce state"
        );
    }

    pub fn info(&self, key: NonceKey) -> NonceInfo {
        let delta = self
            .state
            .entries
            .lock()
            .get(&key)
            .map(|entry| entry.delta)
            .unwrap_or_default();
        NonceInfo {
            delta,
            nonce: self.state.nonces.get(&key),
        }
    }

    fn reserve(&self, key: NonceKey, consume: bool) -> (u64, SharedFetch) {
        let mut entries = self.state.entries.lock();
        let entry = entries.entry(key).or_default();
        let delta = entry.delta;
        let fetch = match &entry.pending {
            Some((_, fetch)) => fetch.clone(),
            None => {
                let generation = self.state.generation.fetch_add(1, Ordering::Relaxed);
                let fetch = self.fetch(key, generation);
                entry.pending = Some((generation, fetch.clone()));
                fetch
            }
        };
        if consume {
            entry.delta += 1;
        }
        (delta, fetch)
    }

    fn fetch(&self, key: NonceKey, generation: u64) -> SharedFetch {
        let source = self.source.clone();
        let state = self.state.clone();
        async move {
            let result = match source.get(&key).await {
                Ok(fetched) => Ok(state.settle(&key, generation, fetched)),
                Err(err) => {
                    state.abandon(&key, generation);
                    Err(err)
                }
            };
            debug!(%key, ?result, "Reconciled nonce");
            result
        }
        .boxed()
        .shared()
    }
}
