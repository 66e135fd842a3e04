//! Login orchestration.
//!
//! [`LoginOrchestrator`] resolves the principal for a login attempt on the
//! plane the request names, checks its credential, and ends in exactly one
//! [`LoginOutcome`]: tokens, an MFA challenge, or a redirect back to an
//! external authorization server.
//!
//! Every credential failure (unknown user, wrong tenant, wrong password,
//! disabled account) surfaces as the same [`AuthError::InvalidCredentials`].

use crate::capability::{CapabilityCheck, CapabilityGate};
use crate::claims::AuthMethod;
use crate::config::AuthConfig;
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use crate::jwt::TokenSigner;
use crate::lifetimes::{EnvironmentSource, LifetimeResolver};
use crate::mfa::{
    MfaChallengeService, MfaCode, MfaSessionManager, SecretCipher, TotpVerifier,
};
use crate::oauth::{AuthorizationServer, OAuthLoginAcceptance, ScopePolicy};
use crate::password::verify_password_blocking;
use crate::principal::{Principal, PrincipalPlane, PrincipalStatus};
use crate::repository::Repositories;
use crate::revocation::RevocationLedger;
use crate::tokens::{TokenBundle, TokenService};
use identity_store::EphemeralStore;
use identity_tenant::Capability;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Credentials presented to [`LoginOrchestrator::login`].
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    /// Login name (SYSTEM principals may also use their email)
    pub username: String,

    /// Plaintext password
    pub password: String,

    /// Tenant to authenticate against; absent means the SYSTEM plane
    #[serde(default)]
    pub tenant_id: Option<Uuid>,

    /// Use the remember-me lifetimes
    #[serde(default)]
    pub remember_me: bool,

    /// Pending external authorization request to complete
    #[serde(default)]
    pub oauth_challenge: Option<String>,
}

impl LoginRequest {
    /// SYSTEM-plane login.
    pub fn system(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            tenant_id: None,
            remember_me: false,
            oauth_challenge: None,
        }
    }

    /// TENANT-plane login.
    pub fn tenant(
        tenant_id: Uuid,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::system(username, password)
        }
    }

    /// Request remember-me lifetimes.
    pub fn remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Complete an external authorization request after login.
    pub fn with_oauth_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.oauth_challenge = Some(challenge.into());
        self
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("tenant_id", &self.tenant_id)
            .field("remember_me", &self.remember_me)
            .field("oauth_challenge", &self.oauth_challenge)
            .finish()
    }
}

/// Second step of an MFA login.
#[derive(Debug, Clone, Deserialize)]
pub struct MfaLoginRequest {
    /// Session returned with [`LoginOutcome::MfaRequired`]
    pub session_id: String,

    /// TOTP or recovery code
    pub code: MfaCode,

    /// Use the remember-me lifetimes
    #[serde(default)]
    pub remember_me: bool,

    /// Pending external authorization request to complete
    #[serde(default)]
    pub oauth_challenge: Option<String>,
}

/// Marker returned when a second factor is needed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MfaRequired {
    /// Always `true`; lets clients branch on the field alone
    pub mfa_required: bool,

    /// Principal that passed the password step
    pub user_id: Uuid,

    /// Tenant of that principal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Challenge session to verify against
    pub session_id: String,

    /// Seconds until the session expires
    pub expires_in: u64,
}

/// Result of a successful login step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LoginOutcome {
    /// Tokens issued directly
    Tokens(TokenBundle),

    /// A second factor is required before tokens are issued
    MfaRequired(MfaRequired),

    /// Hand the user agent back to the authorization server
    Redirect {
        /// URL the user agent should follow
        redirect_to: String,
    },
}

impl LoginOutcome {
    /// Issued tokens, if this outcome carries them.
    pub fn tokens(&self) -> Option<&TokenBundle> {
        match self {
            LoginOutcome::Tokens(bundle) => Some(bundle),
            _ => None,
        }
    }
}

/// Login entry point.
#[derive(Clone)]
pub struct LoginOrchestrator {
    config: Arc<AuthConfig>,
    repositories: Repositories,
    capabilities: CapabilityCheck,
    tokens: TokenService,
    mfa: MfaChallengeService,
    scopes: ScopePolicy,
    authorization_server: Option<Arc<dyn AuthorizationServer>>,
}

impl std::fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("issuer", &self.config.issuer)
            .field("tokens", &self.tokens)
            .field("oauth", &self.authorization_server.is_some())
            .finish_non_exhaustive()
    }
}

impl LoginOrchestrator {
    /// Create an orchestrator from prepared services.
    pub fn new(
        config: Arc<AuthConfig>,
        repositories: Repositories,
        capabilities: CapabilityCheck,
        tokens: TokenService,
        mfa: MfaChallengeService,
    ) -> Self {
        let scopes = ScopePolicy::new(
            config.allowed_scope_namespaces.iter().cloned(),
            capabilities.clone(),
        );
        Self {
            config,
            repositories,
            capabilities,
            tokens,
            mfa,
            scopes,
            authorization_server: None,
        }
    }

    /// Wire every service from configuration.
    ///
    /// Loads the signing keys and snapshots the lifetime environment once;
    /// both stay fixed for the life of the returned value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if no usable signing key is configured.
    pub fn from_config(
        config: AuthConfig,
        repositories: Repositories,
        gate: Arc<dyn CapabilityGate>,
        store: Arc<dyn EphemeralStore>,
        cipher: Arc<dyn SecretCipher>,
    ) -> AuthResult<Self> {
        let timeout = config.call_timeout;
        let signer = Arc::new(TokenSigner::from_config(&config)?);
        let lifetimes = Arc::new(LifetimeResolver::new(
            EnvironmentSource::from_env(),
            config.lifetimes.clone(),
        ));
        let ledger = RevocationLedger::new(store.clone(), timeout);
        let tokens = TokenService::new(signer, lifetimes, ledger, repositories.clone(), timeout);

        let sessions = MfaSessionManager::new(store.clone(), &config.mfa, timeout);
        let verifier = TotpVerifier::new(
            cipher,
            repositories.recovery_codes.clone(),
            config.mfa.totp_skew_steps,
            timeout,
        )
        .with_replay_guard(store);
        let mfa = MfaChallengeService::new(
            sessions,
            repositories.principals.clone(),
            Arc::new(verifier),
            timeout,
        );

        let capabilities = CapabilityCheck::new(gate, timeout);
        Ok(Self::new(Arc::new(config), repositories, capabilities, tokens, mfa))
    }

    /// Enable the OAuth2 hand-off.
    pub fn with_authorization_server(mut self, server: Arc<dyn AuthorizationServer>) -> Self {
        self.authorization_server = Some(server);
        self
    }

    /// Token lifecycle service.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// MFA challenge service.
    pub fn mfa(&self) -> &MfaChallengeService {
        &self.mfa
    }

    /// Authenticate a username and password.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for any credential failure
    /// - `AccountLocked` for a locked account or credential
    /// - `MfaUnavailable` when MFA is required but not permitted
    /// - `CapabilityUnavailable` / `ScopeNotAllowed` on the OAuth2 path
    /// - `Timeout` or a collaborator error when a required step fails
    pub async fn login(&self, request: LoginRequest) -> AuthResult<LoginOutcome> {
        let principal = self.resolve_principal(&request).await?;

        match principal.status {
            PrincipalStatus::Active => {}
            PrincipalStatus::Disabled => {
                tracing::info!(user_id = %principal.id, "Login rejected: account disabled");
                return Err(AuthError::InvalidCredentials);
            }
            PrincipalStatus::Locked => {
                tracing::info!(user_id = %principal.id, "Login rejected: account locked");
                return Err(AuthError::AccountLocked);
            }
        }

        self.check_password(&principal, request.password).await?;

        if self.mfa_required(&principal).await? {
            if let Err(reason) = self
                .capabilities
                .check(&principal.plane, principal.id, &Capability::Mfa)
                .await
            {
                tracing::warn!(
                    user_id = %principal.id,
                    reason = %reason,
                    "MFA required but unavailable"
                );
                return Err(AuthError::MfaUnavailable(reason));
            }

            let challenge = self
                .mfa
                .create_challenge(principal.id, principal.tenant_id())
                .await?;

            tracing::info!(
                user_id = %principal.id,
                tenant_id = ?principal.tenant_id(),
                "Password accepted; MFA required"
            );

            return Ok(LoginOutcome::MfaRequired(MfaRequired {
                mfa_required: true,
                user_id: principal.id,
                tenant_id: principal.tenant_id(),
                session_id: challenge.session_id,
                expires_in: challenge.expires_in,
            }));
        }

        self.finish(
            &principal,
            request.remember_me,
            request.oauth_challenge.as_deref(),
            AuthMethod::Password,
        )
        .await
    }

    /// Verify the second factor of a login.
    ///
    /// Returns `Ok(None)` when the code was rejected; the session stays open
    /// until its attempts run out.
    pub async fn complete_mfa_login(
        &self,
        request: MfaLoginRequest,
    ) -> AuthResult<Option<LoginOutcome>> {
        let verification = self
            .mfa
            .verify_challenge(&request.session_id, &request.code)
            .await?;

        let Some(user_id) = verification.user_id.filter(|_| verification.verified) else {
            return Ok(None);
        };

        let principal = bounded(
            self.config.call_timeout,
            "principal_find_by_id",
            self.repositories.principals.find_by_id(user_id),
        )
        .await?
        .filter(|p| p.is_active() && p.plane == PrincipalPlane::from_tenant(verification.tenant_id))
        .ok_or(AuthError::InvalidCredentials)?;

        self.finish(
            &principal,
            request.remember_me,
            request.oauth_challenge.as_deref(),
            AuthMethod::PasswordMfa,
        )
        .await
        .map(Some)
    }

    async fn finish(
        &self,
        principal: &Principal,
        remember_me: bool,
        oauth_challenge: Option<&str>,
        auth_method: AuthMethod,
    ) -> AuthResult<LoginOutcome> {
        if let Some(challenge) = oauth_challenge {
            let redirect_to = self
                .accept_oauth_login(principal, remember_me, challenge, auth_method)
                .await?;
            return Ok(LoginOutcome::Redirect { redirect_to });
        }

        let bundle = self
            .tokens
            .issue_for(principal, remember_me, &self.config.default_scope, auth_method)
            .await?;
        Ok(LoginOutcome::Tokens(bundle))
    }

    async fn resolve_principal(&self, request: &LoginRequest) -> AuthResult<Principal> {
        let principals = &self.repositories.principals;
        let timeout = self.config.call_timeout;

        let found = match request.tenant_id {
            Some(tenant_id) => bounded(
                timeout,
                "principal_find_by_username",
                principals.find_by_username(&request.username, Some(tenant_id)),
            )
            .await?
            .filter(|p| p.plane == PrincipalPlane::Tenant { tenant_id }),
            None => {
                let by_username = bounded(
                    timeout,
                    "principal_find_by_username",
                    principals.find_by_username(&request.username, None),
                )
                .await?
                .filter(Principal::is_system);

                match by_username {
                    Some(p) => Some(p),
                    None => bounded(
                        timeout,
                        "principal_find_by_email",
                        principals.find_by_email(&request.username, None),
                    )
                    .await?
                    .filter(Principal::is_system),
                }
            }
        };

        found.ok_or_else(|| {
            tracing::info!(
                tenant_id = ?request.tenant_id,
                "Login rejected: no principal on requested plane"
            );
            AuthError::InvalidCredentials
        })
    }

    async fn check_password(&self, principal: &Principal, password: String) -> AuthResult<()> {
        let credentials = &self.repositories.credentials;
        let timeout = self.config.call_timeout;

        let credential = bounded(timeout, "credential_get", credentials.get(principal.id))
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %principal.id, "Principal has no password credential");
                AuthError::InvalidCredentials
            })?;

        if credential.is_locked(self.config.lockout_threshold) {
            tracing::info!(
                user_id = %principal.id,
                failed_attempts = credential.failed_attempt_count,
                "Login rejected: credential locked"
            );
            return Err(AuthError::AccountLocked);
        }

        let valid = verify_password_blocking(password, credential.password_hash).await?;
        if !valid {
            let attempts = bounded(
                timeout,
                "credential_record_failed_attempt",
                credentials.record_failed_attempt(principal.id),
            )
            .await?;
            tracing::info!(
                user_id = %principal.id,
                failed_attempts = attempts,
                "Login rejected: wrong password"
            );
            return Err(AuthError::InvalidCredentials);
        }

        if credential.failed_attempt_count > 0 {
            let reset = bounded(
                timeout,
                "credential_reset_failed_attempts",
                credentials.reset_failed_attempts(principal.id),
            )
            .await;
            if let Err(e) = reset {
                tracing::warn!(
                    user_id = %principal.id,
                    error = %e,
                    "Failed to reset failed-attempt counter"
                );
            }
        }

        Ok(())
    }

    async fn mfa_required(&self, principal: &Principal) -> AuthResult<bool> {
        if principal.mfa_enabled {
            return Ok(true);
        }
        let Some(tenant_id) = principal.tenant_id() else {
            return Ok(false);
        };

        let settings = bounded(
            self.config.call_timeout,
            "tenant_settings_get",
            self.repositories.tenant_settings.get(tenant_id),
        )
        .await?;
        Ok(settings.is_some_and(|s| s.mfa_mandatory()))
    }

    async fn accept_oauth_login(
        &self,
        principal: &Principal,
        remember_me: bool,
        challenge: &str,
        auth_method: AuthMethod,
    ) -> AuthResult<String> {
        if let Err(reason) = self
            .capabilities
            .check(&principal.plane, principal.id, &Capability::OAuth2)
            .await
        {
            tracing::warn!(
                user_id = %principal.id,
                reason = %reason,
                "OAuth2 login denied by capability gate"
            );
            return Err(AuthError::CapabilityUnavailable {
                capability: Capability::OAuth2.key(),
                reason,
            });
        }

        let server = self.authorization_server.as_ref().ok_or_else(|| {
            AuthError::CapabilityUnavailable {
                capability: Capability::OAuth2.key(),
                reason: "no authorization server configured".to_string(),
            }
        })?;

        let timeout = self.config.call_timeout;
        let login_request = bounded(
            timeout,
            "oauth_get_login_request",
            server.get_login_request(challenge),
        )
        .await?;

        let granted_scope = self
            .scopes
            .validate(&principal.plane, principal.id, &login_request.requested_scope)
            .await?;

        let lifetimes = self.tokens.lifetimes_for(principal.tenant_id(), remember_me).await?;
        let mut claims = self
            .tokens
            .base_claims(principal, lifetimes.access())
            .with_scope(granted_scope.join(" "))
            .with_auth_method(auth_method)
            .with_mfa_verified(auth_method == AuthMethod::PasswordMfa);
        if !login_request.requested_audience.is_empty() {
            claims.aud = login_request.requested_audience.clone();
        }

        let acceptance = OAuthLoginAcceptance {
            subject: principal.id.to_string(),
            remember: remember_me,
            remember_for: if remember_me { lifetimes.refresh_ttl_secs } else { 0 },
            granted_scope,
            claims,
        };

        let redirect_to = bounded(
            timeout,
            "oauth_accept_login",
            server.accept_login(challenge, &acceptance),
        )
        .await?;

        tracing::info!(
            user_id = %principal.id,
            client_id = %login_request.client_id,
            "OAuth2 login accepted"
        );

        Ok(redirect_to)
    }
}
