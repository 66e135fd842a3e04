//! In-memory ephemeral store
//!
//! This module provides an in-process implementation of the store contract.
//! It is suitable for single-instance deployments and testing; for multiple
//! service instances use the Redis backend.

use crate::store::{check_ttl, EphemeralStore, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory store with lazy expiry.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with
/// `tokio::time::pause` and `tokio::time::advance`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns the number of entries removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        check_ttl(ttl)?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.value = value.to_string();
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now))
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_keeps_remaining_ttl() {
        let store = MemoryStore::new();
        store.set_ex("k", "v1", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.replace_keep_ttl("k", "v2").await.unwrap());

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(4)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!store.replace_keep_ttl("k", "v3").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_absent_key_writes_nothing() {
        let store = MemoryStore::new();
        assert!(!store.replace_keep_ttl("k", "v").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(!store.delete("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", Duration::from_secs(10)).await.unwrap();

        assert_eq!(store.take("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = MemoryStore::new();
        assert!(store.set_ex("k", "v", Duration::ZERO).await.is_err());
        assert_eq!(store.len().await, 0);
    }
}
