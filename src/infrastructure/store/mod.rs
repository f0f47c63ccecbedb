use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::info;

/// Shared-store errors. The rate limiter treats every variant the same way
/// (fail open), so the split only matters for logs.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}

/// The sorted-set window operations the distributed rate limiter needs from
/// its shared store.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    /// In one atomic operation: prune entries older than the window, count
    /// what remains, record the current request and refresh the
    /// collection's idle expiry. Returns the pre-insertion count.
    async fn record_and_count(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<u64, StoreError>;
}

/// Redis-backed window store. Connections multiplex over one
/// `ConnectionManager`, which reconnects on its own after transient drops.
#[derive(Clone)]
pub struct RedisWindowStore {
    manager: ConnectionManager,
}

impl RedisWindowStore {
    /// Connect with a bounded probe so startup can fall back to the local
    /// limiter quickly when the store is down.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unreachable(format!("connect to {url} timed out")))??;

        info!("connected to shared rate-limit store");
        Ok(Self { manager })
    }
}

#[async_trait]
impl SlidingWindowStore for RedisWindowStore {
    async fn record_and_count(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<u64, StoreError> {
        let cutoff = now_ms.saturating_sub(window_ms);
        // Unique member per request so same-instant requests never collapse
        // into one entry.
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
        let ttl_secs = (window_ms / 1000).max(1) * 2;

        let mut conn = self.manager.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(cutoff)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}
