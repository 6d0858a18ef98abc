use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

pub use self::redis::RedisStore;

mod redis;

/// Sorted sets the scheduler persists messages in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StoreQueue {
    Proposals,
    Withdraw,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Durable sorted-set store of scheduled messages.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Adds `member` with `score`; returns whether it was not present yet.
    async fn add(&self, queue: StoreQueue, score: f64, member: &str) -> Result<bool, StoreError>;

    async fn remove(&self, queue: StoreQueue, member: &str) -> Result<bool, StoreError>;

    /// Every member of `queue`, lowest score first.
    async fn range_all(&self, queue: StoreQueue) -> Result<Vec<String>, StoreError>;
}

/// In-process store, for tests and single-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    queues: Mutex<HashMap<StoreQueue, HashMap<String, f64>>>,
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn add(&self, queue: StoreQueue, score: f64, member: &str) -> Result<bool, StoreError> {
        let previous = self
            .queues
            .lock()
            .entry(queue)
            .or_default()
            .insert(member.to_owned(), score);
        Ok(previous.is_none())
    }

    async fn remove(&self, queue: StoreQueue, member: &str) -> Result<bool, StoreError> {
        let removed = self
            .queues
            .lock()
            .get_mut(&queue)
            .and_then(|members| members.remove(member));
        Ok(removed.is_some())
    }

    async fn range_all(&self, queue: StoreQueue) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.lock();
        let Some(members) = queues.get(&queue) else {
            return Ok(vec![]);
        };
        let mut members = members.iter().collect::<Vec<_>>();
        members.sort_by(|(a, a_score), (b, b_score)| a_score.total_cmp(b_score).then(a.cmp(b)));
        Ok(members.into_iter().map(|(member, _)| member.clone()).collect())
    }
}
