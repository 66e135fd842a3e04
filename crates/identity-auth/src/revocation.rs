//! Revocation ledger.
//!
//! Blocks individual access tokens (by `jti`) and refresh tokens (by digest)
//! until they would have expired anyway. Entries live in the shared
//! [`EphemeralStore`] with a TTL equal to the remaining lifetime of the
//! blocked token, so the ledger never outgrows the set of live tokens.
//!
//! Reads are fail-closed: a backend failure yields
//! [`RevocationStatus::Unknown`], which never permits access.

use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use identity_store::EphemeralStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "revoked";

/// Outcome of a revocation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RevocationStatus {
    /// No revocation entry exists
    Clear,

    /// The token has been revoked
    Revoked,

    /// The ledger could not be consulted
    Unknown(String),
}

impl RevocationStatus {
    /// Only a confirmed clear status permits access.
    pub fn permits_access(&self) -> bool {
        matches!(self, RevocationStatus::Clear)
    }
}

/// Ledger of revoked token identifiers.
#[derive(Clone)]
pub struct RevocationLedger {
    store: Arc<dyn EphemeralStore>,
    timeout: Duration,
}

impl std::fmt::Debug for RevocationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationLedger")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RevocationLedger {
    /// Create a ledger over a shared store.
    pub fn new(store: Arc<dyn EphemeralStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn key(id: &str) -> String {
        format!("{}:{}", KEY_PREFIX, id)
    }

    /// Block an identifier for the remaining lifetime of its token.
    ///
    /// A zero remaining lifetime is a no-op: the token can no longer be
    /// used. Write failures are returned to the caller.
    pub async fn revoke(&self, id: &str, remaining: Duration) -> AuthResult<()> {
        if remaining.is_zero() {
            tracing::debug!(id, "Token already expired; nothing to revoke");
            return Ok(());
        }

        let key = Self::key(id);
        let result = bounded(self.timeout, "revocation_write", async {
            self.store
                .set_ex(&key, "1", remaining)
                .await
                .map_err(AuthError::from)
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(id, ttl_secs = remaining.as_secs(), "Token revoked");
                Ok(())
            }
            Err(AuthError::Timeout(op)) => Err(AuthError::Timeout(op)),
            Err(e) => {
                tracing::warn!(id, error = %e, "Failed to record revocation");
                Err(AuthError::RevocationUnavailable(e.to_string()))
            }
        }
    }

    /// Look up the revocation status of an identifier.
    pub async fn status(&self, id: &str) -> RevocationStatus {
        let key = Self::key(id);
        let result = bounded(self.timeout, "revocation_read", async {
            self.store.exists(&key).await.map_err(AuthError::from)
        })
        .await;

        match result {
            Ok(true) => RevocationStatus::Revoked,
            Ok(false) => RevocationStatus::Clear,
            Err(e) => {
                tracing::warn!(
                    id,
                    error = %e,
                    "Revocation ledger unavailable; treating token as unverifiable"
                );
                RevocationStatus::Unknown(e.to_string())
            }
        }
    }

    /// Whether an identifier is revoked.
    ///
    /// Fails with [`AuthError::RevocationUnavailable`] when the ledger cannot
    /// be consulted; callers must treat that as a denial.
    pub async fn is_revoked(&self, id: &str) -> AuthResult<bool> {
        match self.status(id).await {
            RevocationStatus::Clear => Ok(false),
            RevocationStatus::Revoked => Ok(true),
            RevocationStatus::Unknown(reason) => Err(AuthError::RevocationUnavailable(reason)),
        }
    }
}
