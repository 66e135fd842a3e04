//! # Identity Store
//!
//! This crate provides the shared, TTL-capable ephemeral store used by the
//! authentication core for state that must be visible to every service
//! instance but only lives for a bounded time.
//!
//! ## Overview
//!
//! The identity-store crate handles:
//! - **MFA sessions**: Short-lived, attempt-limited challenge records
//! - **Revocation ledger**: Denylist rows keyed by jti or refresh-token hash
//! - **OAuth state**: PKCE/CSRF state for outbound federation
//!
//! ## Features
//!
//! - `memory` (default): In-process store for single-instance deployments and tests
//! - `redis`: Redis-backed store for multi-instance deployments
//!
//! ## Usage
//!
//! ```rust,no_run
//! use identity_store::{EphemeralStore, MemoryStore};
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), identity_store::StoreError> {
//!     let store = MemoryStore::new();
//!
//!     store.set_ex("mfa:session:abc", "{}", Duration::from_secs(300)).await?;
//!     assert!(store.exists("mfa:session:abc").await?);
//!
//!     // Deleting an absent key is not an error
//!     store.delete("mfa:session:abc").await?;
//!     store.delete("mfa:session:abc").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Semantics
//!
//! Every backend must honour the same contract:
//! - Expired keys are indistinguishable from absent keys
//! - `replace_keep_ttl` only overwrites a live key and never extends its TTL
//! - `delete` is idempotent
//! - `take` reads and deletes in one step (single-use values)

pub mod store;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

// Re-export main types
pub use store::{EphemeralStore, StoreError, StoreResult};

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis::RedisStore;
