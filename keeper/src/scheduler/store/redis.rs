use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument};

use super::{ProposalStore, StoreError, StoreQueue};

/// Sorted sets in Redis, one key per queue.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    #[instrument(skip_all)]
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!("Connected to redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl ProposalStore for RedisStore {
    async fn add(&self, queue: StoreQueue, score: f64, member: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let added: usize = connection.zadd(queue.as_ref(), member, score).await?;
        Ok(added > 0)
    }

    async fn remove(&self, queue: StoreQueue, member: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let removed: usize = connection.zrem(queue.as_ref(), member).await?;
        Ok(removed > 0)
    }

    async fn range_all(&self, queue: StoreQueue) -> Result<Vec<String>, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection
            .zrangebyscore(queue.as_ref(), "-inf", "+inf")
            .await?)
    }
}
