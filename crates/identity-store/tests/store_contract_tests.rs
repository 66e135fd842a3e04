//! Contract tests shared by every `EphemeralStore` backend.
//!
//! The authentication core relies on these semantics for MFA sessions, the
//! revocation ledger and OAuth state; a backend that fails any of them is
//! unsafe to deploy.
//!
//! The Redis run needs a live server and is ignored by default:
//! `REDIS_URL=redis://localhost:6379 cargo test --features redis -- --ignored`

use identity_store::{EphemeralStore, MemoryStore, StoreError};
use std::time::Duration;

/// Run the full contract against a store, using `ns` to keep keys apart.
async fn exercise_contract(store: &dyn EphemeralStore, ns: &str) {
    let key = format!("{}:session", ns);
    let missing = format!("{}:missing", ns);

    // absent keys
    assert_eq!(store.get(&missing).await.unwrap(), None);
    assert!(!store.exists(&missing).await.unwrap());
    assert_eq!(store.ttl(&missing).await.unwrap(), None);
    assert!(!store.replace_keep_ttl(&missing, "x").await.unwrap());
    assert!(!store.exists(&missing).await.unwrap());

    // set / get / overwrite
    store.set_ex(&key, "v1", Duration::from_secs(300)).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("v1"));
    assert!(store.replace_keep_ttl(&key, "v2").await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("v2"));

    let ttl = store.ttl(&key).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(300));
    assert!(ttl > Duration::from_secs(250));

    // single-use take
    assert_eq!(store.take(&key).await.unwrap().as_deref(), Some("v2"));
    assert_eq!(store.take(&key).await.unwrap(), None);

    // idempotent delete
    store.set_ex(&key, "v3", Duration::from_secs(300)).await.unwrap();
    assert!(store.delete(&key).await.unwrap());
    assert!(!store.delete(&key).await.unwrap());

    // zero TTL is refused
    assert!(matches!(
        store.set_ex(&key, "v4", Duration::ZERO).await,
        Err(StoreError::InvalidTtl(_))
    ));
    assert!(!store.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryStore::new();
    exercise_contract(&store, "contract").await;
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_memory_store_replace_never_extends() {
    let store = MemoryStore::new();
    store.set_ex("k", "a", Duration::from_secs(60)).await.unwrap();

    tokio::time::advance(Duration::from_secs(45)).await;
    assert!(store.replace_keep_ttl("k", "b").await.unwrap());

    tokio::time::advance(Duration::from_secs(16)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
    assert!(!store.replace_keep_ttl("k", "c").await.unwrap());
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires a running Redis server (REDIS_URL)"]
async fn test_redis_store_contract() {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
    let store = identity_store::RedisStore::new(&url, "identity-contract")
        .await
        .unwrap();
    let ns = uuid_like();
    exercise_contract(&store, &ns).await;
}

#[cfg(feature = "redis")]
fn uuid_like() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("run-{}", nanos)
}
