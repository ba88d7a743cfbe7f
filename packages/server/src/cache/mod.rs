//! Fast lookup cache for orders.
//!
//! The cache is never authoritative: every entry can be rebuilt from the
//! durable store, and cache failures degrade to a miss or a skipped write.

pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use common::Order;
use thiserror::Error;

pub use self::redis::RedisOrderCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cached value could not be decoded: {0}")]
    Decode(serde_json::Error),

    #[error("order could not be encoded for caching: {0}")]
    Encode(serde_json::Error),
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Order>, CacheError>;

    async fn set(&self, key: &str, order: &Order, ttl: Duration) -> Result<(), CacheError>;
}
