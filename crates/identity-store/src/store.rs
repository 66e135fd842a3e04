//! Ephemeral store abstraction
//!
//! This module provides the store trait shared by all backends and the
//! error type they report.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Ephemeral store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached (connection refused, I/O, timeout)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with an error
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Invalid TTL supplied by the caller
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}

impl StoreError {
    /// Check if the error means the backend is unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared key/value store with per-key expiry.
///
/// Implementations must be visible to every service instance that shares the
/// same backend; correctness of the authentication core relies on that.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Get a live value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value with a TTL, replacing any previous value and TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Overwrite a live value keeping its remaining TTL.
    ///
    /// Returns `false` if the key was absent or already expired, in which case
    /// nothing is written.
    async fn replace_keep_ttl(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Delete a key. Returns whether a live key was removed; deleting an
    /// absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Check whether a live key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining TTL of a live key (`None` if absent).
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Get and delete a value in one step.
    async fn take(&self, key: &str) -> StoreResult<Option<String>>;
}

/// Reject zero TTLs; a zero TTL would create a key that never expires on
/// some backends.
pub(crate) fn check_ttl(ttl: Duration) -> StoreResult<()> {
    if ttl.is_zero() {
        return Err(StoreError::InvalidTtl("TTL must be positive".to_string()));
    }
    Ok(())
}
