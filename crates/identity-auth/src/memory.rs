//! In-memory repository implementations.
//!
//! These are suitable for single-process deployments and testing.
//! Production deployments back the repository traits with a database.

use crate::crypto;
use crate::error::AuthResult;
use crate::principal::{Credential, Principal};
use crate::refresh::RefreshTokenRecord;
use crate::repository::{
    CredentialRepository, PrincipalRepository, RecoveryCodeRepository, RefreshTokenRepository,
    Repositories, TenantSettingsRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use identity_tenant::TenantSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory principal directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrincipalRepository {
    principals: Arc<RwLock<HashMap<Uuid, Principal>>>,
}

impl MemoryPrincipalRepository {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a principal.
    pub async fn insert(&self, principal: Principal) {
        self.principals.write().await.insert(principal.id, principal);
    }

    async fn find_by<F>(&self, tenant_id: Option<Uuid>, matches: F) -> Option<Principal>
    where
        F: Fn(&Principal) -> bool,
    {
        let principals = self.principals.read().await;
        let mut found: Vec<&Principal> = principals
            .values()
            .filter(|p| p.tenant_id() == tenant_id && matches(p))
            .collect();
        // stable pick when several share a name
        found.sort_by_key(|p| p.id);
        found.first().map(|p| (*p).clone())
    }
}

#[async_trait]
impl PrincipalRepository for MemoryPrincipalRepository {
    async fn find_by_username(
        &self,
        username: &str,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<Option<Principal>> {
        Ok(self.find_by(tenant_id, |p| p.username == username).await)
    }

    async fn find_by_email(
        &self,
        email: &str,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<Option<Principal>> {
        Ok(self
            .find_by(tenant_id, |p| p.email.eq_ignore_ascii_case(email))
            .await)
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Principal>> {
        Ok(self.principals.read().await.get(&id).cloned())
    }

    async fn update(&self, principal: &Principal) -> AuthResult<()> {
        let mut principals = self.principals.write().await;
        match principals.get_mut(&principal.id) {
            Some(existing) => {
                *existing = principal.clone();
                Ok(())
            }
            None => Err(crate::error::AuthError::Repository(format!(
                "Principal {} not found",
                principal.id
            ))),
        }
    }
}

/// In-memory credential store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialRepository {
    credentials: Arc<RwLock<HashMap<Uuid, Credential>>>,
}

impl MemoryCredentialRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a credential.
    pub async fn insert(&self, credential: Credential) {
        self.credentials
            .write()
            .await
            .insert(credential.user_id, credential);
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn get(&self, user_id: Uuid) -> AuthResult<Option<Credential>> {
        Ok(self.credentials.read().await.get(&user_id).cloned())
    }

    async fn record_failed_attempt(&self, user_id: Uuid) -> AuthResult<u32> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&user_id) {
            Some(credential) => {
                credential.failed_attempt_count = credential.failed_attempt_count.saturating_add(1);
                Ok(credential.failed_attempt_count)
            }
            None => Ok(0),
        }
    }

    async fn reset_failed_attempts(&self, user_id: Uuid) -> AuthResult<()> {
        if let Some(credential) = self.credentials.write().await.get_mut(&user_id) {
            credential.failed_attempt_count = 0;
        }
        Ok(())
    }
}

/// In-memory refresh token records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRefreshTokenRepository {
    records: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
}

impl MemoryRefreshTokenRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryRefreshTokenRepository {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        self.records
            .write()
            .await
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn get_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        Ok(self.records.read().await.get(token_hash).cloned())
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> AuthResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(token_hash) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let now = Utc::now();
        let mut count = 0;
        for record in self.records.write().await.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }
}

/// In-memory recovery codes.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecoveryCodeRepository {
    codes: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl MemoryRecoveryCodeRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecoveryCodeRepository for MemoryRecoveryCodeRepository {
    async fn replace(&self, user_id: Uuid, code_hashes: Vec<String>) -> AuthResult<()> {
        self.codes.write().await.insert(user_id, code_hashes);
        Ok(())
    }

    async fn verify_and_delete(&self, user_id: Uuid, code_hash: &str) -> AuthResult<bool> {
        let mut codes = self.codes.write().await;
        let Some(hashes) = codes.get_mut(&user_id) else {
            return Ok(false);
        };

        let position = hashes
            .iter()
            .position(|h| crypto::constant_time_eq(h.as_bytes(), code_hash.as_bytes()));
        match position {
            Some(index) => {
                hashes.swap_remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remaining(&self, user_id: Uuid) -> AuthResult<usize> {
        Ok(self.codes.read().await.get(&user_id).map_or(0, Vec::len))
    }
}

/// In-memory tenant settings.
#[derive(Debug, Clone, Default)]
pub struct MemoryTenantSettingsRepository {
    settings: Arc<RwLock<HashMap<Uuid, TenantSettings>>>,
}

impl MemoryTenantSettingsRepository {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the settings of a tenant.
    pub async fn insert(&self, tenant_id: Uuid, settings: TenantSettings) {
        self.settings.write().await.insert(tenant_id, settings);
    }
}

#[async_trait]
impl TenantSettingsRepository for MemoryTenantSettingsRepository {
    async fn get(&self, tenant_id: Uuid) -> AuthResult<Option<TenantSettings>> {
        Ok(self.settings.read().await.get(&tenant_id).cloned())
    }
}

/// One in-memory instance of every repository, sharing nothing.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepositories {
    /// Principal directory
    pub principals: MemoryPrincipalRepository,

    /// Password credentials
    pub credentials: MemoryCredentialRepository,

    /// Refresh token records
    pub refresh_tokens: MemoryRefreshTokenRepository,

    /// MFA recovery codes
    pub recovery_codes: MemoryRecoveryCodeRepository,

    /// Tenant settings
    pub tenant_settings: MemoryTenantSettingsRepository,
}

impl MemoryRepositories {
    /// Create empty repositories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trait-object handles sharing state with `self`.
    pub fn repositories(&self) -> Repositories {
        Repositories {
            principals: Arc::new(self.principals.clone()),
            credentials: Arc::new(self.credentials.clone()),
            refresh_tokens: Arc::new(self.refresh_tokens.clone()),
            recovery_codes: Arc::new(self.recovery_codes.clone()),
            tenant_settings: Arc::new(self.tenant_settings.clone()),
        }
    }
}
