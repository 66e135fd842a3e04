//! Token lifecycle.
//!
//! [`TokenService`] issues access, ID and refresh tokens for an authenticated
//! principal, rotates refresh tokens, and answers authentication,
//! introspection (RFC 7662) and revocation (RFC 7009) requests.
//!
//! Refresh tokens are one-time: every refresh revokes the presented record
//! and persists a new one. A new access token is never returned unless its
//! refresh record was stored.

use crate::claims::{AuthMethod, TokenClaims, TokenUse};
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{TokenSigner, VerificationKey};
use crate::lifetimes::{LifetimeResolver, TokenLifetimes};
use crate::principal::{Principal, PrincipalPlane, PrincipalType};
use crate::refresh::{RefreshTokenRecord, RefreshTokens};
use crate::repository::Repositories;
use crate::revocation::{RevocationLedger, RevocationStatus};
use identity_tenant::TenantSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Tokens returned by a login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBundle {
    /// Signed access token
    pub access_token: String,

    /// Opaque one-time refresh token
    pub refresh_token: String,

    /// Signed ID token, present when `openid` was granted on login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Token type (always "Bearer")
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,

    /// Granted scope
    pub scope: String,
}

impl TokenBundle {
    fn new(
        access_token: String,
        refresh_token: String,
        id_token: Option<String>,
        lifetimes: &TokenLifetimes,
        scope: String,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            token_type: "Bearer".to_string(),
            expires_in: lifetimes.access_ttl_secs,
            refresh_expires_in: lifetimes.refresh_ttl_secs,
            scope,
        }
    }
}

/// Token type hint for introspection and revocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// Signed access token
    AccessToken,

    /// Opaque refresh token
    RefreshToken,

    /// Signed ID token
    IdToken,
}

impl TokenTypeHint {
    /// Parse an RFC 7009 `token_type_hint` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "access_token" => Some(TokenTypeHint::AccessToken),
            "refresh_token" => Some(TokenTypeHint::RefreshToken),
            "id_token" => Some(TokenTypeHint::IdToken),
            _ => None,
        }
    }
}

/// RFC 7662 introspection response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntrospectionResponse {
    /// Whether the token is currently usable
    pub active: bool,

    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Login name of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Email of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// `access_token`, `id_token` or `refresh_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Expiration (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// SYSTEM or TENANT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_type: Option<PrincipalType>,

    /// Tenant of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Tenant roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Tenant permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,

    /// Platform roles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_roles: Vec<String>,

    /// Platform permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_permissions: Vec<String>,
}

impl IntrospectionResponse {
    /// Response for any token that is not usable.
    pub fn inactive() -> Self {
        Self::default()
    }

    fn from_claims(claims: TokenClaims) -> Self {
        let token_type = match claims.token_use {
            TokenUse::Access => "access_token",
            TokenUse::Id => "id_token",
        };
        Self {
            active: true,
            scope: Some(claims.scope),
            username: Some(claims.username),
            email: Some(claims.email),
            token_type: Some(token_type.to_string()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            nbf: Some(claims.nbf),
            sub: Some(claims.sub),
            aud: Some(claims.aud),
            iss: Some(claims.iss),
            jti: Some(claims.jti),
            principal_type: Some(claims.principal_type),
            tenant_id: claims.tenant_id,
            roles: claims.roles,
            permissions: claims.permissions,
            system_roles: claims.system_roles,
            system_permissions: claims.system_permissions,
        }
    }

    fn from_refresh_record(record: RefreshTokenRecord) -> Self {
        Self {
            active: true,
            scope: Some(record.scope),
            token_type: Some("refresh_token".to_string()),
            exp: Some(record.expires_at.timestamp()),
            iat: Some(record.created_at.timestamp()),
            sub: Some(record.user_id.to_string()),
            principal_type: Some(PrincipalPlane::from_tenant(record.tenant_id).principal_type()),
            tenant_id: record.tenant_id,
            ..Self::default()
        }
    }
}

fn looks_like_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Token issuance, rotation, validation and revocation.
#[derive(Clone)]
pub struct TokenService {
    signer: Arc<TokenSigner>,
    lifetimes: Arc<LifetimeResolver>,
    ledger: RevocationLedger,
    repositories: Repositories,
    timeout: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("signer", &self.signer)
            .field("lifetimes", &self.lifetimes)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create the service.
    ///
    /// # Arguments
    ///
    /// * `signer` - Signing keys, loaded once at start
    /// * `lifetimes` - Lifetime resolver, built once at start
    /// * `ledger` - Revocation ledger
    /// * `repositories` - Collaborator repositories
    /// * `timeout` - Deadline for each collaborator call
    pub fn new(
        signer: Arc<TokenSigner>,
        lifetimes: Arc<LifetimeResolver>,
        ledger: RevocationLedger,
        repositories: Repositories,
        timeout: Duration,
    ) -> Self {
        Self {
            signer,
            lifetimes,
            ledger,
            repositories,
            timeout,
        }
    }

    /// Public verification key; `None` in symmetric fallback mode.
    pub fn verification_key(&self) -> Option<&VerificationKey> {
        self.signer.verification_key()
    }

    /// Signer used for every token.
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Resolve lifetimes for a plane, fetching tenant settings when needed.
    pub async fn lifetimes_for(
        &self,
        tenant_id: Option<Uuid>,
        remember_me: bool,
    ) -> AuthResult<TokenLifetimes> {
        let settings = self.tenant_settings(tenant_id).await?;
        Ok(self.lifetimes.resolve(settings.as_ref(), remember_me))
    }

    async fn tenant_settings(&self, tenant_id: Option<Uuid>) -> AuthResult<Option<TenantSettings>> {
        match tenant_id {
            Some(tenant_id) => {
                bounded(
                    self.timeout,
                    "tenant_settings_get",
                    self.repositories.tenant_settings.get(tenant_id),
                )
                .await
            }
            None => Ok(None),
        }
    }

    /// Issue a token bundle for an authenticated principal.
    ///
    /// An ID token is included when `scope` contains `openid`. Fails, and
    /// returns nothing, if the refresh record cannot be stored.
    pub async fn issue_for(
        &self,
        principal: &Principal,
        remember_me: bool,
        scope: &str,
        auth_method: AuthMethod,
    ) -> AuthResult<TokenBundle> {
        let lifetimes = self.lifetimes_for(principal.tenant_id(), remember_me).await?;
        let mfa_verified = auth_method == AuthMethod::PasswordMfa;

        let access_token =
            self.sign_access(principal, &lifetimes, scope, auth_method, mfa_verified)?;

        let id_token = if scope.split_whitespace().any(|s| s == "openid") {
            let claims = self
                .base_claims(principal, lifetimes.id())
                .with_token_use(TokenUse::Id)
                .with_scope(scope)
                .with_auth_method(auth_method)
                .with_mfa_verified(mfa_verified);
            Some(self.signer.sign(&claims)?)
        } else {
            None
        };

        let refresh_token = RefreshTokens::generate();
        let record = RefreshTokenRecord::new(
            &refresh_token,
            principal.id,
            principal.tenant_id(),
            lifetimes.refresh(),
            remember_me,
        )
        .with_scope(scope)
        .with_mfa_verified(mfa_verified);
        self.persist_refresh_record(&record).await?;

        tracing::info!(
            user_id = %principal.id,
            principal_type = %principal.principal_type(),
            tenant_id = ?principal.tenant_id(),
            remember_me,
            access_ttl_secs = lifetimes.access_ttl_secs,
            "Tokens issued"
        );

        Ok(TokenBundle::new(
            access_token,
            refresh_token,
            id_token,
            &lifetimes,
            scope.to_string(),
        ))
    }

    /// Access-token claims for a principal with this service's issuer and audience.
    pub fn base_claims(&self, principal: &Principal, duration: chrono::Duration) -> TokenClaims {
        TokenClaims::for_principal(
            principal,
            self.signer.issuer(),
            self.signer.audience().to_vec(),
            duration,
        )
    }

    fn sign_access(
        &self,
        principal: &Principal,
        lifetimes: &TokenLifetimes,
        scope: &str,
        auth_method: AuthMethod,
        mfa_verified: bool,
    ) -> AuthResult<String> {
        let claims = self
            .base_claims(principal, lifetimes.access())
            .with_scope(scope)
            .with_auth_method(auth_method)
            .with_mfa_verified(mfa_verified);
        self.signer.sign(&claims)
    }

    async fn persist_refresh_record(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        bounded(
            self.timeout,
            "refresh_token_create",
            self.repositories.refresh_tokens.create(record),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                user_id = %record.user_id,
                error = %e,
                "Failed to persist refresh token record"
            );
            e
        })
    }

    /// Rotate a refresh token.
    ///
    /// The presented token is revoked and a new access/refresh pair is
    /// returned; no ID token is minted on refresh.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        let token_hash = RefreshTokens::hash(refresh_token);
        let record = bounded(
            self.timeout,
            "refresh_token_get",
            self.repositories.refresh_tokens.get_by_hash(&token_hash),
        )
        .await?
        .filter(|r| RefreshTokens::verify(refresh_token, &r.token_hash))
        .ok_or_else(|| AuthError::InvalidToken("Unknown refresh token".to_string()))?;

        if record.is_revoked() {
            tracing::warn!(user_id = %record.user_id, "Revoked refresh token presented");
            return Err(AuthError::RefreshTokenRevoked);
        }
        if record.is_expired() {
            return Err(AuthError::RefreshTokenExpired);
        }
        if self.ledger.is_revoked(&record.token_hash).await? {
            return Err(AuthError::RefreshTokenRevoked);
        }

        let principal = bounded(
            self.timeout,
            "principal_find_by_id",
            self.repositories.principals.find_by_id(record.user_id),
        )
        .await?
        .filter(|p| p.is_active() && p.plane == PrincipalPlane::from_tenant(record.tenant_id))
        .ok_or_else(|| AuthError::InvalidToken("Refresh token subject is not active".to_string()))?;

        let revoked = bounded(
            self.timeout,
            "refresh_token_revoke",
            self.repositories.refresh_tokens.revoke_by_hash(&record.token_hash),
        )
        .await;
        match revoked {
            Ok(true) => {}
            // another refresh with the same token won the race
            Ok(false) => return Err(AuthError::RefreshTokenRevoked),
            Err(e) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    error = %e,
                    "Failed to revoke rotated refresh token"
                );
            }
        }

        let lifetimes = self.lifetimes_for(record.tenant_id, record.remember_me).await?;

        let access_token = self.sign_access(
            &principal,
            &lifetimes,
            &record.scope,
            AuthMethod::Refresh,
            record.mfa_verified,
        )?;

        let new_token = RefreshTokens::generate();
        let new_record = RefreshTokenRecord::new(
            &new_token,
            principal.id,
            principal.tenant_id(),
            lifetimes.refresh(),
            record.remember_me,
        )
        .with_scope(record.scope.clone())
        .with_mfa_verified(record.mfa_verified);
        self.persist_refresh_record(&new_record).await?;

        tracing::info!(
            user_id = %principal.id,
            tenant_id = ?principal.tenant_id(),
            "Refresh token rotated"
        );

        Ok(TokenBundle::new(
            access_token,
            new_token,
            None,
            &lifetimes,
            record.scope,
        ))
    }

    /// Authenticate a bearer access token.
    ///
    /// A revoked token is [`AuthError::InvalidToken`]; an unreachable ledger
    /// is [`AuthError::RevocationUnavailable`]. Neither ever yields claims.
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<TokenClaims> {
        let claims = self.signer.validate(access_token, TokenUse::Access)?;

        match self.ledger.status(&claims.jti).await {
            RevocationStatus::Clear => Ok(claims),
            RevocationStatus::Revoked => {
                Err(AuthError::InvalidToken("Token has been revoked".to_string()))
            }
            RevocationStatus::Unknown(reason) => Err(AuthError::RevocationUnavailable(reason)),
        }
    }

    /// Introspect a token (RFC 7662).
    ///
    /// Never fails: invalid, expired, revoked and unverifiable tokens all
    /// report `active: false`.
    pub async fn introspect(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> IntrospectionResponse {
        let refresh_first = hint == Some(TokenTypeHint::RefreshToken) || !looks_like_jwt(token);

        let response = if refresh_first {
            match self.introspect_refresh(token).await {
                Some(response) => Some(response),
                None => self.introspect_signed(token).await,
            }
        } else {
            match self.introspect_signed(token).await {
                Some(response) => Some(response),
                None => self.introspect_refresh(token).await,
            }
        };

        response.unwrap_or_else(IntrospectionResponse::inactive)
    }

    async fn introspect_signed(&self, token: &str) -> Option<IntrospectionResponse> {
        if !looks_like_jwt(token) {
            return None;
        }
        let claims = self
            .signer
            .validate(token, TokenUse::Access)
            .or_else(|_| self.signer.validate(token, TokenUse::Id))
            .ok()?;

        if self.ledger.status(&claims.jti).await.permits_access() {
            Some(IntrospectionResponse::from_claims(claims))
        } else {
            None
        }
    }

    async fn introspect_refresh(&self, token: &str) -> Option<IntrospectionResponse> {
        let token_hash = RefreshTokens::hash(token);
        let record = bounded(
            self.timeout,
            "refresh_token_get",
            self.repositories.refresh_tokens.get_by_hash(&token_hash),
        )
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Refresh token lookup failed during introspection");
            e
        })
        .ok()??;

        if record.is_revoked() || record.is_expired() {
            return None;
        }
        if !self.ledger.status(&record.token_hash).await.permits_access() {
            return None;
        }
        Some(IntrospectionResponse::from_refresh_record(record))
    }

    /// Revoke a token (RFC 7009).
    ///
    /// Unknown, malformed and already expired tokens succeed as no-ops.
    /// Failing to record a revocation is an error.
    pub async fn revoke(&self, token: &str, hint: Option<TokenTypeHint>) -> AuthResult<()> {
        let refresh_first = hint == Some(TokenTypeHint::RefreshToken) || !looks_like_jwt(token);

        let found = if refresh_first {
            self.revoke_refresh(token).await? || self.revoke_signed(token).await?
        } else {
            self.revoke_signed(token).await? || self.revoke_refresh(token).await?
        };

        if !found {
            tracing::debug!(hint = ?hint, "Revocation requested for an unknown token");
        }
        Ok(())
    }

    async fn revoke_signed(&self, token: &str) -> AuthResult<bool> {
        if !looks_like_jwt(token) {
            return Ok(false);
        }
        let claims = match self.signer.decode_allow_expired(token) {
            Ok(claims) => claims,
            Err(_) => return Ok(false),
        };

        let remaining = Duration::from_secs(claims.remaining_secs().max(0) as u64);
        self.ledger.revoke(&claims.jti, remaining).await?;
        Ok(true)
    }

    async fn revoke_refresh(&self, token: &str) -> AuthResult<bool> {
        let token_hash = RefreshTokens::hash(token);
        let record = bounded(
            self.timeout,
            "refresh_token_get",
            self.repositories.refresh_tokens.get_by_hash(&token_hash),
        )
        .await?;

        let Some(record) = record else {
            return Ok(false);
        };

        bounded(
            self.timeout,
            "refresh_token_revoke",
            self.repositories.refresh_tokens.revoke_by_hash(&token_hash),
        )
        .await?;

        let remaining = Duration::from_secs(record.remaining_secs() as u64);
        self.ledger.revoke(&record.token_hash, remaining).await?;

        tracing::info!(user_id = %record.user_id, "Refresh token revoked");
        Ok(true)
    }

    /// Revoke every refresh token of a principal (sign out everywhere).
    ///
    /// Outstanding access tokens stay valid until they expire.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> AuthResult<u64> {
        let count = bounded(
            self.timeout,
            "refresh_token_revoke_all",
            self.repositories.refresh_tokens.revoke_all_for_user(user_id),
        )
        .await?;

        tracing::info!(user_id = %user_id, count, "All refresh tokens revoked");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::tests::TEST_SECRET;
    use crate::memory::MemoryRepositories;
    use crate::repository::RefreshTokenRepository;
    use crate::revocation::tests::DownStore;
    use identity_store::MemoryStore;

    fn service_with(repos: &MemoryRepositories, ledger: RevocationLedger) -> TokenService {
        let signer = TokenSigner::with_secret("identity", TEST_SECRET).unwrap();
        TokenService::new(
            Arc::new(signer),
            Arc::new(LifetimeResolver::default()),
            ledger,
            repos.repositories(),
            Duration::from_secs(1),
        )
    }

    fn service(repos: &MemoryRepositories) -> TokenService {
        let ledger = RevocationLedger::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        service_with(repos, ledger)
    }

    async fn principal(repos: &MemoryRepositories) -> Principal {
        let principal = Principal::tenant(Uuid::now_v7(), "alice", "alice@example.com");
        repos.principals.insert(principal.clone()).await;
        principal
    }

    #[tokio::test]
    async fn test_issue_bundle() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let bundle = service
            .issue_for(&principal, false, "openid profile", AuthMethod::Password)
            .await
            .unwrap();

        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.expires_in, 15 * 60);
        assert_eq!(bundle.refresh_expires_in, 30 * 24 * 60 * 60);
        assert!(bundle.id_token.is_some());
        assert_eq!(repos.refresh_tokens.len().await, 1);

        let claims = service.authenticate(&bundle.access_token).await.unwrap();
        assert_eq!(claims.user_id(), Some(principal.id));
        assert_eq!(claims.tenant_id, principal.tenant_id());
        assert!(claims.has_scope("profile"));

        let id_claims = service
            .signer()
            .validate(bundle.id_token.as_deref().unwrap(), TokenUse::Id)
            .unwrap();
        assert_eq!(id_claims.sub, claims.sub);
    }

    #[tokio::test]
    async fn test_no_id_token_without_openid() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let bundle = service
            .issue_for(&principal, false, "profile", AuthMethod::Password)
            .await
            .unwrap();
        assert!(bundle.id_token.is_none());
    }

    #[tokio::test]
    async fn test_tenant_lifetimes_apply() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let mut settings = TenantSettings::default();
        settings.lifetimes.access_token_ttl_secs = Some(120);
        repos
            .tenant_settings
            .insert(principal.tenant_id().unwrap(), settings)
            .await;

        let bundle = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();
        assert_eq!(bundle.expires_in, 120);
    }

    #[tokio::test]
    async fn test_oversized_tenant_lifetime_falls_back() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let mut settings = TenantSettings::default();
        settings.lifetimes.refresh_token_ttl_secs = Some(10_000_000_000_000);
        repos
            .tenant_settings
            .insert(principal.tenant_id().unwrap(), settings)
            .await;

        let bundle = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();
        assert_eq!(bundle.refresh_expires_in, 30 * 24 * 60 * 60);

        let refreshed = service.refresh(&bundle.refresh_token).await.unwrap();
        assert_eq!(refreshed.refresh_expires_in, 30 * 24 * 60 * 60);
    }

    #[tokio::test]
    async fn test_refresh_rotation_is_one_time() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let first = service
            .issue_for(&principal, true, "openid", AuthMethod::PasswordMfa)
            .await
            .unwrap();
        let second = service.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(second.id_token.is_none());
        assert_eq!(second.expires_in, 60 * 60);

        let claims = service.authenticate(&second.access_token).await.unwrap();
        assert_eq!(claims.auth_method, AuthMethod::Refresh);
        assert!(claims.mfa_verified);

        let reuse = service.refresh(&first.refresh_token).await;
        assert!(matches!(reuse, Err(AuthError::RefreshTokenRevoked)));
        assert_eq!(
            reuse.unwrap_err().to_string(),
            "Refresh token has been revoked"
        );

        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_unknown_and_expired() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        assert!(matches!(
            service.refresh("not-a-token").await,
            Err(AuthError::InvalidToken(_))
        ));

        let token = RefreshTokens::generate();
        let mut record = RefreshTokenRecord::new(
            &token,
            principal.id,
            principal.tenant_id(),
            chrono::Duration::days(1),
            false,
        );
        record.expires_at = chrono::Utc::now() - chrono::Duration::seconds(5);
        repos.refresh_tokens.create(&record).await.unwrap();

        assert!(matches!(
            service.refresh(&token).await,
            Err(AuthError::RefreshTokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_refresh_requires_active_principal() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;

        let bundle = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();
        repos
            .principals
            .insert(principal.clone().with_status(crate::principal::PrincipalStatus::Disabled))
            .await;

        assert!(matches!(
            service.refresh(&bundle.refresh_token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_access_token() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;
        let bundle = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();

        service.revoke(&bundle.access_token, None).await.unwrap();

        assert!(matches!(
            service.authenticate(&bundle.access_token).await,
            Err(AuthError::InvalidToken(_))
        ));
        assert!(!service.introspect(&bundle.access_token, None).await.active);
    }

    #[tokio::test]
    async fn test_revoke_refresh_token() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;
        let bundle = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();

        assert!(service.introspect(&bundle.refresh_token, None).await.active);
        service
            .revoke(&bundle.refresh_token, Some(TokenTypeHint::RefreshToken))
            .await
            .unwrap();

        assert!(!service.introspect(&bundle.refresh_token, None).await.active);
        assert!(matches!(
            service.refresh(&bundle.refresh_token).await,
            Err(AuthError::RefreshTokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_revoke_unknown_is_noop() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);

        service.revoke("garbage", None).await.unwrap();
        service.revoke("a.b.c", Some(TokenTypeHint::AccessToken)).await.unwrap();
    }

    #[tokio::test]
    async fn test_introspect_active_access_token() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;
        let bundle = service
            .issue_for(&principal, false, "openid email", AuthMethod::Password)
            .await
            .unwrap();

        let response = service
            .introspect(&bundle.access_token, Some(TokenTypeHint::AccessToken))
            .await;
        assert!(response.active);
        assert_eq!(response.token_type.as_deref(), Some("access_token"));
        assert_eq!(response.scope.as_deref(), Some("openid email"));
        assert_eq!(response.tenant_id, principal.tenant_id());
        assert_eq!(response.principal_type, Some(PrincipalType::Tenant));
        assert_eq!(response.email.as_deref(), Some("alice@example.com"));

        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({"active": false}));
    }

    #[tokio::test]
    async fn test_ledger_outage_fails_closed() {
        let repos = MemoryRepositories::new();
        let healthy = service(&repos);
        let principal = principal(&repos).await;
        let bundle = healthy
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();

        let down = service_with(
            &repos,
            RevocationLedger::new(Arc::new(DownStore), Duration::from_secs(1)),
        );

        assert!(matches!(
            down.authenticate(&bundle.access_token).await,
            Err(AuthError::RevocationUnavailable(_))
        ));
        assert!(!down.introspect(&bundle.access_token, None).await.active);
        assert!(matches!(
            down.refresh(&bundle.refresh_token).await,
            Err(AuthError::RevocationUnavailable(_))
        ));
        assert!(down.revoke(&bundle.access_token, None).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user() {
        let repos = MemoryRepositories::new();
        let service = service(&repos);
        let principal = principal(&repos).await;
        let a = service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();
        service
            .issue_for(&principal, false, "openid", AuthMethod::Password)
            .await
            .unwrap();

        assert_eq!(service.revoke_all_for_user(principal.id).await.unwrap(), 2);
        assert!(matches!(
            service.refresh(&a.refresh_token).await,
            Err(AuthError::RefreshTokenRevoked)
        ));
    }
}
