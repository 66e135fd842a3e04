//! Redis-backed ephemeral store for distributed deployments.
//!
//! This module provides a Redis implementation of the store contract so that
//! every service instance sees the same MFA sessions, revocation entries and
//! OAuth state.

use crate::store::{check_ttl, EphemeralStore, StoreError, StoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::time::Duration;

/// Redis-backed store.
///
/// All keys are namespaced with a prefix (`{prefix}:{key}`). Commands rely on
/// Redis 6.2+ (`SET ... KEEPTTL`, `GETDEL`).
///
/// # Example
///
/// ```rust,no_run
/// use identity_store::RedisStore;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let store = RedisStore::new("redis://localhost:6379", "identity").await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    /// Multiplexed, auto-reconnecting connection
    conn: ConnectionManager,

    /// Key prefix for all Redis operations
    prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisStore {
    /// Create a new Redis store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., `redis://localhost:6379`)
    /// * `prefix` - Key prefix for Redis operations (e.g., `identity`)
    ///
    /// # Returns
    ///
    /// A new `RedisStore` or an error if the server cannot be reached
    pub async fn new(redis_url: &str, prefix: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        tracing::info!(prefix = %prefix, "Redis ephemeral store connected");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        namespaced(&self.prefix, key)
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

/// Classify Redis errors: unreachable backends must surface as
/// `Unavailable` so fail-closed callers can tell them apart.
fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        check_ttl(ttl)?;
        let mut conn = self.conn.clone();
        // PX keeps sub-second remainders from being rounded to zero
        let millis = ttl.as_millis().max(1) as u64;

        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)?;

        tracing::debug!(key = %key, ttl_ms = millis, "Stored ephemeral value");
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(count > 0)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        // -2: missing key, -1: key without expiry (never written by this store)
        Ok(match millis {
            m if m > 0 => Some(Duration::from_millis(m as u64)),
            -1 => Some(Duration::MAX),
            _ => None,
        })
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GETDEL")
            .arg(self.key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }
}
