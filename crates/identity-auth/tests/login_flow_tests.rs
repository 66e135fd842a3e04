//! End-to-end tests for the login, MFA and token lifecycle flows.
//!
//! Every collaborator is an in-memory implementation; the authorization
//! server is a recording fake and the shared store can be switched off to
//! simulate a ledger outage.
//!
//! Flows:
//! 1. Tenant login → tokens → refresh rotation → replay rejected
//! 2. Tenant mismatch reported exactly like a wrong password
//! 3. MFA marker → wrong codes → exhaustion
//! 4. MFA marker → TOTP → tokens flagged as MFA verified
//! 5. Revocation ledger outage denies authentication
//! 6. OAuth2 hand-off → redirect with validated scopes
//! 7. Remember-me lifetimes from tenant settings

use async_trait::async_trait;
use identity_auth::crypto::base32_decode;
use identity_auth::{
    AuthConfig, AuthError, AuthMethod, AuthResult, AuthorizationServer, Credential,
    LoginOrchestrator, LoginOutcome, LoginRequest, MemoryRepositories, MfaCode, MfaEnrollment,
    MfaLoginRequest, OAuthLoginAcceptance, OAuthLoginRequest, PlaintextSecretCipher, Principal,
    SigningConfig, StaticCapabilityGate, TokenTypeHint,
};
use identity_store::{EphemeralStore, MemoryStore, StoreError, StoreResult};
use identity_tenant::{Capability, TenantSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const SECRET: &str = "integration-test-secret-at-least-32-chars";

/// Memory store that can be taken offline.
#[derive(Default)]
struct SwitchableStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl SwitchableStore {
    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EphemeralStore for SwitchableStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }
    async fn replace_keep_ttl(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.replace_keep_ttl(key, value).await
    }
    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.check()?;
        self.inner.ttl(key).await
    }
    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        self.inner.take(key).await
    }
}

/// Authorization server that serves one pending request and records acceptances.
struct FakeAuthorizationServer {
    requested_scope: Vec<String>,
    accepted: Mutex<Vec<OAuthLoginAcceptance>>,
}

impl FakeAuthorizationServer {
    fn new(scopes: &[&str]) -> Self {
        Self {
            requested_scope: scopes.iter().map(|s| s.to_string()).collect(),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AuthorizationServer for FakeAuthorizationServer {
    async fn get_login_request(&self, challenge: &str) -> AuthResult<OAuthLoginRequest> {
        Ok(OAuthLoginRequest {
            challenge: challenge.to_string(),
            client_id: "reports-app".to_string(),
            requested_scope: self.requested_scope.clone(),
            requested_audience: vec!["reports-api".to_string()],
        })
    }

    async fn accept_login(
        &self,
        challenge: &str,
        acceptance: &OAuthLoginAcceptance,
    ) -> AuthResult<String> {
        self.accepted
            .lock()
            .map_err(|_| AuthError::Internal("poisoned".into()))?
            .push(acceptance.clone());
        Ok(format!("https://auth.example.com/oauth2/auth?login_verifier={}", challenge))
    }
}

/// Test fixture wiring the orchestrator over in-memory collaborators.
struct TestFixture {
    /// Collaborator repositories.
    repos: MemoryRepositories,
    /// Capability rules.
    gate: StaticCapabilityGate,
    /// Shared ephemeral store.
    store: Arc<SwitchableStore>,
    /// Tenant every TENANT principal belongs to.
    tenant_id: Uuid,
    /// System under test.
    login: LoginOrchestrator,
}

impl TestFixture {
    fn new() -> Self {
        Self::with_config(AuthConfig::default())
    }

    fn with_config(config: AuthConfig) -> Self {
        let repos = MemoryRepositories::new();
        let gate = StaticCapabilityGate::new();
        let store = Arc::new(SwitchableStore::default());
        let config = AuthConfig {
            signing: SigningConfig::with_secret(SECRET),
            call_timeout: Duration::from_secs(1),
            ..config
        };
        let login = LoginOrchestrator::from_config(
            config,
            repos.repositories(),
            Arc::new(gate.clone()),
            store.clone(),
            Arc::new(PlaintextSecretCipher),
        )
        .unwrap();

        Self {
            repos,
            gate,
            store,
            tenant_id: Uuid::now_v7(),
            login,
        }
    }

    async fn add(&self, principal: Principal, password: &str) -> Principal {
        let hash = identity_auth::password::hash_password(password).unwrap();
        self.repos.credentials.insert(Credential::new(principal.id, hash)).await;
        self.repos.principals.insert(principal.clone()).await;
        principal
    }

    async fn add_tenant_user(&self, username: &str, password: &str) -> Principal {
        let email = format!("{}@example.com", username);
        self.add(Principal::tenant(self.tenant_id, username, email), password)
            .await
    }

    async fn require_mfa(&self) {
        let mut settings = TenantSettings::for_tenant(self.tenant_id);
        settings.security.require_mfa = true;
        self.repos.tenant_settings.insert(self.tenant_id, settings).await;
        self.gate.support(Capability::Mfa).await;
        self.gate.set_tenant(self.tenant_id, Capability::Mfa, true).await;
    }

    fn enrollment(&self) -> MfaEnrollment {
        MfaEnrollment::new(
            Arc::new(self.repos.principals.clone()),
            Arc::new(self.repos.recovery_codes.clone()),
            Arc::new(PlaintextSecretCipher),
            "Identity",
            Duration::from_secs(1),
        )
    }
}

fn current_totp(secret_base32: &str) -> String {
    let secret = base32_decode(secret_base32).unwrap();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    totp_lite::totp_custom::<totp_lite::Sha1>(30, 6, &secret, now)
}

#[tokio::test]
async fn test_tenant_login_and_refresh_rotation() {
    let fx = TestFixture::new();
    let alice = fx.add_tenant_user("alice", "correct horse").await;

    let outcome = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse"))
        .await
        .unwrap();
    let first = outcome.tokens().unwrap().clone();

    let claims = fx.login.tokens().authenticate(&first.access_token).await.unwrap();
    assert_eq!(claims.user_id(), Some(alice.id));
    assert_eq!(claims.tenant_id, Some(fx.tenant_id));
    assert!(claims.system_roles.is_empty());

    let second = fx.login.tokens().refresh(&first.refresh_token).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert!(second.id_token.is_none());

    let refreshed = fx.login.tokens().authenticate(&second.access_token).await.unwrap();
    assert_eq!(refreshed.auth_method, AuthMethod::Refresh);
    assert_eq!(refreshed.sub, claims.sub);

    let replay = fx.login.tokens().refresh(&first.refresh_token).await.unwrap_err();
    assert!(matches!(replay, AuthError::RefreshTokenRevoked));
    assert_eq!(replay.to_string(), "Refresh token has been revoked");

    // the rotated token still works exactly once
    fx.login.tokens().refresh(&second.refresh_token).await.unwrap();
}

#[tokio::test]
async fn test_tenant_mismatch_is_generic() {
    let fx = TestFixture::new();
    fx.add_tenant_user("alice", "correct horse").await;

    let other_tenant = fx
        .login
        .login(LoginRequest::tenant(Uuid::now_v7(), "alice", "correct horse"))
        .await
        .unwrap_err();
    let wrong_password = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "battery staple"))
        .await
        .unwrap_err();

    assert!(matches!(other_tenant, AuthError::InvalidCredentials));
    assert_eq!(other_tenant.to_string(), wrong_password.to_string());
    assert_eq!(other_tenant.status_code(), wrong_password.status_code());
    assert_eq!(other_tenant.error_code(), wrong_password.error_code());
}

#[tokio::test]
async fn test_mfa_exhaustion() {
    let fx = TestFixture::new();
    fx.require_mfa().await;
    let alice = fx.add_tenant_user("alice", "correct horse").await;
    fx.enrollment().begin(&alice).await.unwrap();

    let outcome = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse"))
        .await
        .unwrap();
    let LoginOutcome::MfaRequired(marker) = outcome else {
        panic!("expected MFA marker");
    };
    assert_eq!(marker.user_id, alice.id);
    assert_eq!(marker.tenant_id, Some(fx.tenant_id));
    assert!(fx.repos.refresh_tokens.is_empty().await);

    let attempt = |code: &str| MfaLoginRequest {
        session_id: marker.session_id.clone(),
        code: MfaCode::Totp(code.to_string()),
        remember_me: false,
        oauth_challenge: None,
    };

    for _ in 0..4 {
        let result = fx.login.complete_mfa_login(attempt("000000")).await.unwrap();
        assert!(result.is_none());
    }

    let fifth = fx.login.complete_mfa_login(attempt("000000")).await.unwrap_err();
    assert!(matches!(fifth, AuthError::MaxAttemptsExceeded));

    let after = fx.login.complete_mfa_login(attempt("000000")).await.unwrap_err();
    assert!(matches!(after, AuthError::SessionInvalid));
    assert!(fx.repos.refresh_tokens.is_empty().await);
}

#[tokio::test]
async fn test_mfa_totp_completes_login() {
    let fx = TestFixture::new();
    fx.require_mfa().await;
    let alice = fx.add_tenant_user("alice", "correct horse").await;
    let enrollment = fx.enrollment().begin(&alice).await.unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));

    let LoginOutcome::MfaRequired(marker) = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse"))
        .await
        .unwrap()
    else {
        panic!("expected MFA marker");
    };

    let outcome = fx
        .login
        .complete_mfa_login(MfaLoginRequest {
            session_id: marker.session_id,
            code: MfaCode::Totp(current_totp(&enrollment.secret)),
            remember_me: false,
            oauth_challenge: None,
        })
        .await
        .unwrap()
        .expect("code accepted");

    let bundle = outcome.tokens().unwrap();
    let claims = fx.login.tokens().authenticate(&bundle.access_token).await.unwrap();
    assert!(claims.mfa_verified);
    assert_eq!(claims.auth_method, AuthMethod::PasswordMfa);

    // refreshed tokens keep the second factor
    let refreshed = fx.login.tokens().refresh(&bundle.refresh_token).await.unwrap();
    let claims = fx.login.tokens().authenticate(&refreshed.access_token).await.unwrap();
    assert!(claims.mfa_verified);
}

#[tokio::test]
async fn test_revocation_outage_fails_closed() {
    let fx = TestFixture::new();
    fx.add_tenant_user("alice", "correct horse").await;

    let bundle = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse"))
        .await
        .unwrap()
        .tokens()
        .cloned()
        .unwrap();

    fx.store.down.store(true, Ordering::SeqCst);

    let err = fx.login.tokens().authenticate(&bundle.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RevocationUnavailable(_)));

    let introspection = fx
        .login
        .tokens()
        .introspect(&bundle.access_token, Some(TokenTypeHint::AccessToken))
        .await;
    assert!(!introspection.active);

    fx.store.down.store(false, Ordering::SeqCst);

    fx.login
        .tokens()
        .revoke(&bundle.access_token, Some(TokenTypeHint::AccessToken))
        .await
        .unwrap();
    let err = fx.login.tokens().authenticate(&bundle.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_oauth_handoff_redirects() {
    let fx = TestFixture::with_config(AuthConfig {
        allowed_scope_namespaces: vec!["reports".to_string()],
        ..AuthConfig::default()
    });
    let server = Arc::new(FakeAuthorizationServer::new(&["openid", "reports:read"]));
    let login = fx.login.clone().with_authorization_server(server.clone());
    let alice = fx.add_tenant_user("alice", "correct horse").await;

    for capability in [Capability::OAuth2, Capability::ScopeNamespace("reports".into())] {
        fx.gate.support(capability.clone()).await;
        fx.gate.set_tenant(fx.tenant_id, capability, true).await;
    }

    let outcome = login
        .login(
            LoginRequest::tenant(fx.tenant_id, "alice", "correct horse")
                .remember_me(true)
                .with_oauth_challenge("challenge-1"),
        )
        .await
        .unwrap();

    let LoginOutcome::Redirect { redirect_to } = outcome else {
        panic!("expected redirect");
    };
    assert!(redirect_to.ends_with("login_verifier=challenge-1"));
    assert!(fx.repos.refresh_tokens.is_empty().await);

    let accepted = server.accepted.lock().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].subject, alice.id.to_string());
    assert_eq!(accepted[0].granted_scope, vec!["openid", "reports:read"]);
    assert!(accepted[0].remember);
    assert_eq!(accepted[0].remember_for, 90 * 24 * 60 * 60);
    assert_eq!(accepted[0].claims.aud, vec!["reports-api"]);
    assert_eq!(accepted[0].claims.tenant_id, Some(fx.tenant_id));
}

#[tokio::test]
async fn test_oauth_rejects_unlisted_namespace() {
    let fx = TestFixture::new();
    let server = Arc::new(FakeAuthorizationServer::new(&["openid", "admin:all"]));
    let login = fx.login.clone().with_authorization_server(server.clone());
    fx.add(Principal::system("root", "root@example.com"), "correct horse").await;
    fx.gate.support(Capability::OAuth2).await;

    let err = login
        .login(LoginRequest::system("root", "correct horse").with_oauth_challenge("challenge-2"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ScopeNotAllowed(ref s) if s == "admin:all"));
    assert!(server.accepted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oauth_denied_by_tenant_capability() {
    let fx = TestFixture::new();
    let login = fx
        .login
        .clone()
        .with_authorization_server(Arc::new(FakeAuthorizationServer::new(&["openid"])));
    fx.add_tenant_user("alice", "correct horse").await;
    fx.gate.support(Capability::OAuth2).await;

    let err = login
        .login(
            LoginRequest::tenant(fx.tenant_id, "alice", "correct horse")
                .with_oauth_challenge("challenge-3"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthError::CapabilityUnavailable { ref capability, .. } if capability == "oauth2"
    ));
}

#[tokio::test]
async fn test_remember_me_lifetimes() {
    let fx = TestFixture::new();
    fx.add_tenant_user("alice", "correct horse").await;

    let mut settings = TenantSettings::for_tenant(fx.tenant_id);
    settings.lifetimes.remember_me_enabled = true;
    settings.lifetimes.remember_me_access_token_ttl_secs = Some(2 * 60 * 60);
    fx.repos.tenant_settings.insert(fx.tenant_id, settings).await;

    let remembered = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse").remember_me(true))
        .await
        .unwrap()
        .tokens()
        .cloned()
        .unwrap();
    assert_eq!(remembered.expires_in, 2 * 60 * 60);
    // no tenant remember-me refresh value, so the defaults decide
    assert_eq!(remembered.refresh_expires_in, 90 * 24 * 60 * 60);

    let standard = fx
        .login
        .login(LoginRequest::tenant(fx.tenant_id, "alice", "correct horse"))
        .await
        .unwrap()
        .tokens()
        .cloned()
        .unwrap();
    assert_eq!(standard.expires_in, 15 * 60);
    assert_eq!(standard.refresh_expires_in, 30 * 24 * 60 * 60);

    // refresh keeps the remember-me profile
    let refreshed = fx.login.tokens().refresh(&remembered.refresh_token).await.unwrap();
    assert_eq!(refreshed.expires_in, 2 * 60 * 60);
}
