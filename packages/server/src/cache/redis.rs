use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::Order;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheError, OrderCache};

/// [`OrderCache`] storing JSON-encoded orders in Redis.
///
/// Every call is bounded by `op_timeout`. The connection manager reconnects on
/// its own, so a Redis outage shows up as per-call errors.
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisOrderCache {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = bounded(op_timeout, ConnectionManager::new(client)).await?;
        info!(url = %url, "Connected to cache");
        Ok(Self { conn, op_timeout })
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CacheError::Timeout(limit))?
        .map_err(CacheError::from)
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = bounded(self.op_timeout, conn.get(key)).await?;

        raw.map(|s| serde_json::from_str(&s).map_err(CacheError::Decode))
            .transpose()
    }

    async fn set(&self, key: &str, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let value = serde_json::to_string(order).map_err(CacheError::Encode)?;
        let mut conn = self.conn.clone();
        // Redis rejects an expiry of zero.
        let seconds = ttl.as_secs().max(1);
        bounded(self.op_timeout, conn.set_ex::<_, _, ()>(key, value, seconds)).await
    }
}
