//! Collaborator contracts for persistent state.
//!
//! The authentication core never owns users, credentials, refresh token
//! records or tenant settings; it consumes them through these traits.
//! In-memory implementations live in [`crate::memory`].

use crate::error::AuthResult;
use crate::principal::{Credential, Principal};
use crate::refresh::RefreshTokenRecord;
use async_trait::async_trait;
use identity_tenant::TenantSettings;
use std::sync::Arc;
use uuid::Uuid;

/// Principal lookups and updates.
///
/// Lookups are scoped to a plane: `tenant_id = None` searches SYSTEM
/// principals, `Some(id)` searches the principals of that tenant only.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    /// Find a principal by login name within a plane.
    async fn find_by_username(
        &self,
        username: &str,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<Option<Principal>>;

    /// Find a principal by email within a plane.
    async fn find_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<Option<Principal>>;

    /// Find a principal by ID.
    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>>;

    /// Persist changes to an existing principal.
    async fn update(&self, principal: &Principal) -> AuthResult<()>;
}

/// Password credentials and the failed-attempt counter.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Get the credential for a principal.
    async fn get(&self, user_id: Uuid) -> AuthResult<Option<Credential>>;

    /// Atomically increment the failed-attempt counter, returning the new value.
    async fn record_failed_attempt(&self, user_id: Uuid) -> AuthResult<u32>;

    /// Reset the failed-attempt counter.
    async fn reset_failed_attempts(&self, user_id: Uuid) -> AuthResult<()>;
}

/// Refresh token records, keyed by token digest.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Persist a new record.
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Look a record up by token digest.
    async fn get_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Mark a record revoked.
    ///
    /// Returns `true` only when this call moved a live record to revoked;
    /// `false` when the record is missing or was already revoked. Rotation
    /// relies on this to let exactly one concurrent refresh win. An already
    /// revoked record keeps its first `revoked_at`.
    async fn revoke_by_hash(&self, token_hash: &str) -> AuthResult<bool>;

    /// Revoke every live record of a principal, returning how many changed.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> AuthResult<u64>;
}

/// One-time MFA recovery codes, stored as digests.
#[async_trait]
pub trait RecoveryCodeRepository: Send + Sync {
    /// Replace all recovery codes of a principal.
    async fn replace(&self, user_id: Uuid, code_hashes: Vec<String>) -> AuthResult<()>;

    /// Consume a code. Returns `true` only if the digest matched an unused code.
    async fn verify_and_delete(&self, user_id: Uuid, code_hash: &str) -> AuthResult<bool>;

    /// Number of unused codes.
    async fn remaining(&self, user_id: Uuid) -> AuthResult<usize>;
}

/// Tenant settings lookups.
#[async_trait]
pub trait TenantSettingsRepository: Send + Sync {
    /// Get the settings of a tenant, if it has any.
    async fn get(&self, tenant_id: Uuid) -> AuthResult<Option<TenantSettings>>;
}

/// Every collaborator repository the core consumes.
#[derive(Clone)]
pub struct Repositories {
    /// Principal directory
    pub principals: Arc<dyn PrincipalRepository>,

    /// Password credentials
    pub credentials: Arc<dyn CredentialRepository>,

    /// Refresh token records
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,

    /// MFA recovery codes
    pub recovery_codes: Arc<dyn RecoveryCodeRepository>,

    /// Tenant settings
    pub tenant_settings: Arc<dyn TenantSettingsRepository>,
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
