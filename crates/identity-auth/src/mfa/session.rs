//! MFA challenge sessions.
//!
//! A session is created when a login needs a second factor and lives in the
//! shared [`EphemeralStore`] so every service instance sees it. Sessions are
//! single-use and attempt-limited:
//!
//! ```text
//! CREATED --fail, attempts < max--> CREATED
//! CREATED --fail, attempts = max--> DELETED (exhausted)
//! CREATED --window elapsed-------> DELETED (expired)
//! CREATED --success--------------> DELETED (consumed)
//! ```

use crate::config::MfaConfig;
use crate::crypto;
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use identity_store::EphemeralStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const KEY_PREFIX: &str = "mfa:session";

/// Random bytes in a session id.
const SESSION_ID_BYTES: usize = 32;

/// Stored challenge session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MfaSession {
    /// Opaque session id
    pub session_id: String,

    /// Principal being challenged
    pub user_id: Uuid,

    /// Tenant of the principal; `None` for SYSTEM principals
    pub tenant_id: Option<Uuid>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// When the session stops being accepted
    pub expires_at: DateTime<Utc>,

    /// Attempts charged so far
    pub attempts: u32,

    /// Attempts allowed
    pub max_attempts: u32,
}

impl MfaSession {
    /// Whether every allowed attempt has been used.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Response to a challenge creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MfaChallenge {
    /// Opaque session id to present with the code
    pub session_id: String,

    /// Seconds until the session expires
    pub expires_in: u64,
}

/// Manages challenge sessions in the shared store.
#[derive(Clone)]
pub struct MfaSessionManager {
    store: Arc<dyn EphemeralStore>,
    ttl: Duration,
    max_attempts: u32,
    timeout: Duration,
}

impl std::fmt::Debug for MfaSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaSessionManager")
            .field("ttl", &self.ttl)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl MfaSessionManager {
    /// Create a manager.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared ephemeral store
    /// * `config` - Session window and attempt limit
    /// * `timeout` - Deadline for each store call
    pub fn new(store: Arc<dyn EphemeralStore>, config: &MfaConfig, timeout: Duration) -> Self {
        Self {
            store,
            ttl: config.session_ttl,
            max_attempts: config.max_attempts,
            timeout,
        }
    }

    fn key(session_id: &str) -> String {
        format!("{}:{}", KEY_PREFIX, session_id)
    }

    /// Start a new challenge session.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<MfaChallenge> {
        let session_id = crypto::random_token(SESSION_ID_BYTES);
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AuthError::ConfigError(format!("Invalid MFA session TTL: {}", e)))?;

        let session = MfaSession {
            session_id: session_id.clone(),
            user_id,
            tenant_id,
            created_at: now,
            expires_at: now + window,
            attempts: 0,
            max_attempts: self.max_attempts,
        };
        let payload = serde_json::to_string(&session)
            .map_err(|e| AuthError::Internal(format!("MFA session encoding failed: {}", e)))?;

        let key = Self::key(&session_id);
        bounded(self.timeout, "mfa_session_create", async {
            self.store
                .set_ex(&key, &payload, self.ttl)
                .await
                .map_err(AuthError::from)
        })
        .await?;

        tracing::debug!(user_id = %user_id, tenant_id = ?tenant_id, "MFA session created");

        Ok(MfaChallenge {
            session_id,
            expires_in: self.ttl.as_secs(),
        })
    }

    async fn load(&self, session_id: &str) -> AuthResult<Option<MfaSession>> {
        let key = Self::key(session_id);
        let raw = bounded(self.timeout, "mfa_session_get", async {
            self.store.get(&key).await.map_err(AuthError::from)
        })
        .await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AuthError::Internal(format!("MFA session decoding failed: {}", e))
            }),
            None => Ok(None),
        }
    }

    /// Fetch a live session.
    ///
    /// Fails with [`AuthError::SessionInvalid`] when absent or expired, and
    /// with [`AuthError::MaxAttemptsExceeded`] (deleting it) when exhausted.
    pub async fn verify_session(&self, session_id: &str) -> AuthResult<MfaSession> {
        let session = self
            .load(session_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        if session.expires_at <= Utc::now() {
            self.delete_session(session_id).await?;
            return Err(AuthError::SessionInvalid);
        }

        if session.is_exhausted() {
            self.delete_session(session_id).await?;
            return Err(AuthError::MaxAttemptsExceeded);
        }

        Ok(session)
    }

    /// Charge one attempt.
    ///
    /// The remaining TTL is preserved. Reaching the limit deletes the session
    /// and fails with [`AuthError::MaxAttemptsExceeded`].
    pub async fn increment_attempts(&self, session_id: &str) -> AuthResult<MfaSession> {
        let mut session = self
            .load(session_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        session.attempts = session.attempts.saturating_add(1);

        if session.is_exhausted() {
            self.delete_session(session_id).await?;
            tracing::warn!(
                user_id = %session.user_id,
                attempts = session.attempts,
                "MFA session exhausted"
            );
            return Err(AuthError::MaxAttemptsExceeded);
        }

        let payload = serde_json::to_string(&session)
            .map_err(|e| AuthError::Internal(format!("MFA session encoding failed: {}", e)))?;
        let key = Self::key(session_id);
        let replaced = bounded(self.timeout, "mfa_session_update", async {
            self.store
                .replace_keep_ttl(&key, &payload)
                .await
                .map_err(AuthError::from)
        })
        .await?;

        if !replaced {
            // expired between fetch and write
            return Err(AuthError::SessionInvalid);
        }

        Ok(session)
    }

    /// Delete a session. Deleting an absent session succeeds.
    pub async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        let key = Self::key(session_id);
        bounded(self.timeout, "mfa_session_delete", async {
            self.store.delete(&key).await.map_err(AuthError::from)
        })
        .await?;
        Ok(())
    }
}
