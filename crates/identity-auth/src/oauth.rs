//! OAuth 2.0 authorization hand-off
//!
//! When a login carries an authorization-server challenge, the core does not
//! mint tokens itself. It validates the requested scopes, builds the claims
//! the authorization server should embed, and accepts the login request; the
//! client is then redirected back into the authorization server's flow.
//!
//! This module also keeps PKCE/CSRF state for outbound federation in the
//! shared ephemeral store so any service instance can complete a callback.

use crate::capability::CapabilityCheck;
use crate::claims::TokenClaims;
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use crate::principal::PrincipalPlane;
use async_trait::async_trait;
use identity_store::EphemeralStore;
use identity_tenant::Capability;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Scopes every client may request.
pub const STANDARD_SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Lifetime of stored OAuth state.
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

/// Pending login request held by the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthLoginRequest {
    /// Login challenge
    pub challenge: String,

    /// Requesting client
    pub client_id: String,

    /// Scopes the client asked for
    #[serde(default)]
    pub requested_scope: Vec<String>,

    /// Audiences the client asked for
    #[serde(default)]
    pub requested_audience: Vec<String>,
}

/// Accepted login sent back to the authorization server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthLoginAcceptance {
    /// Authenticated subject
    pub subject: String,

    /// Whether the authorization server should remember the session
    pub remember: bool,

    /// Seconds to remember the session for (0 = browser session)
    pub remember_for: i64,

    /// Scopes granted after validation
    pub granted_scope: Vec<String>,

    /// Claims to embed in the tokens the authorization server issues
    pub claims: TokenClaims,
}

/// External OAuth2 authorization server.
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    /// Fetch the pending login request for a challenge.
    async fn get_login_request(&self, challenge: &str) -> AuthResult<OAuthLoginRequest>;

    /// Accept the login. Returns the URL to redirect the client to.
    async fn accept_login(
        &self,
        challenge: &str,
        acceptance: &OAuthLoginAcceptance,
    ) -> AuthResult<String>;
}

/// Namespace of a custom scope: the text before the first `:` or `.`.
///
/// ```
/// use identity_auth::oauth::scope_namespace;
///
/// assert_eq!(scope_namespace("billing:read"), "billing");
/// assert_eq!(scope_namespace("reports.export"), "reports");
/// assert_eq!(scope_namespace("admin"), "admin");
/// ```
pub fn scope_namespace(scope: &str) -> &str {
    scope
        .split(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(scope)
}

/// Validates requested scopes before they are granted.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    allowed_namespaces: HashSet<String>,
    capabilities: CapabilityCheck,
}

impl ScopePolicy {
    /// Create a policy.
    pub fn new(
        allowed_namespaces: impl IntoIterator<Item = String>,
        capabilities: CapabilityCheck,
    ) -> Self {
        Self {
            allowed_namespaces: allowed_namespaces.into_iter().collect(),
            capabilities,
        }
    }

    /// Validate every requested scope, returning the granted list.
    ///
    /// Standard scopes always pass. A custom scope needs its namespace in
    /// the configured allow list and, for TENANT principals, a grant of
    /// [`Capability::ScopeNamespace`] from the capability gate. The first
    /// failing scope rejects the whole request.
    pub async fn validate(
        &self,
        plane: &PrincipalPlane,
        user_id: Uuid,
        requested: &[String],
    ) -> AuthResult<Vec<String>> {
        let mut granted = Vec::with_capacity(requested.len());
        let mut checked: HashSet<&str> = HashSet::new();

        for scope in requested {
            if STANDARD_SCOPES.contains(&scope.as_str()) {
                granted.push(scope.clone());
                continue;
            }

            let namespace = scope_namespace(scope);
            if namespace.is_empty() || !self.allowed_namespaces.contains(namespace) {
                tracing::warn!(scope = %scope, "Requested scope namespace is not allowed");
                return Err(AuthError::ScopeNotAllowed(scope.clone()));
            }

            if matches!(plane, PrincipalPlane::Tenant { .. }) && checked.insert(namespace) {
                let capability = Capability::ScopeNamespace(namespace.to_string());
                if let Err(reason) = self.capabilities.check(plane, user_id, &capability).await {
                    tracing::warn!(
                        scope = %scope,
                        reason = %reason,
                        "Scope namespace denied for tenant"
                    );
                    return Err(AuthError::ScopeNotAllowed(scope.clone()));
                }
            }

            granted.push(scope.clone());
        }

        Ok(granted)
    }
}

/// OAuth state for CSRF protection and PKCE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthState {
    /// Random state value
    pub state: String,

    /// PKCE code verifier
    pub code_verifier: Option<String>,

    /// Redirect URL after authentication
    pub redirect_after: Option<String>,

    /// Tenant the federation flow was started for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Additional data to pass through
    #[serde(default)]
    pub extra: HashMap<String, String>,

    /// Created timestamp
    pub created_at: i64,
}

impl OAuthState {
    /// Create a new OAuth state.
    pub fn new() -> Self {
        use rand::Rng;
        let state: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        Self {
            state,
            code_verifier: None,
            redirect_after: None,
            tenant_id: None,
            extra: HashMap::new(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Create with PKCE support.
    pub fn with_pkce() -> Self {
        use rand::Rng;
        let code_verifier: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();

        let mut state = Self::new();
        state.code_verifier = Some(code_verifier);
        state
    }

    /// Bind the flow to a tenant.
    pub fn for_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Set the post-login redirect.
    pub fn with_redirect(mut self, redirect_after: impl Into<String>) -> Self {
        self.redirect_after = Some(redirect_after.into());
        self
    }

    /// Get the PKCE code challenge (S256).
    pub fn code_challenge(&self) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.code_verifier.as_ref().map(|verifier| {
            let hash = Sha256::digest(verifier.as_bytes());
            base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, hash)
        })
    }
}

impl Default for OAuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth state kept in the shared ephemeral store.
///
/// States expire after ten minutes and can be consumed exactly once.
#[derive(Clone)]
pub struct OAuthStateStore {
    store: Arc<dyn EphemeralStore>,
    timeout: Duration,
}

impl std::fmt::Debug for OAuthStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStateStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OAuthStateStore {
    /// Create a state store over a shared store.
    pub fn new(store: Arc<dyn EphemeralStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    fn key(state: &str) -> String {
        format!("oauth:state:{}", state)
    }

    /// Store a state for the callback.
    pub async fn save(&self, state: &OAuthState) -> AuthResult<()> {
        let payload = serde_json::to_string(state)
            .map_err(|e| AuthError::Internal(format!("OAuth state encoding failed: {}", e)))?;
        let key = Self::key(&state.state);

        bounded(self.timeout, "oauth_state_save", async {
            self.store
                .set_ex(&key, &payload, OAUTH_STATE_TTL)
                .await
                .map_err(AuthError::from)
        })
        .await
    }

    /// Consume a state. Returns `None` if unknown, expired or already used.
    pub async fn consume(&self, state: &str) -> AuthResult<Option<OAuthState>> {
        let key = Self::key(state);
        let raw = bounded(self.timeout, "oauth_state_take", async {
            self.store.take(&key).await.map_err(AuthError::from)
        })
        .await?;

        raw.map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| AuthError::Internal(format!("OAuth state decoding failed: {}", e)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StaticCapabilityGate;
    use identity_store::MemoryStore;

    async fn policy(gate: StaticCapabilityGate) -> ScopePolicy {
        ScopePolicy::new(
            vec!["billing".to_string(), "reports".to_string()],
            CapabilityCheck::new(Arc::new(gate), Duration::from_secs(1)),
        )
    }

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scope_namespace() {
        assert_eq!(scope_namespace("billing:read"), "billing");
        assert_eq!(scope_namespace("billing.read:all"), "billing");
        assert_eq!(scope_namespace(":read"), "");
    }

    #[tokio::test]
    async fn test_standard_scopes_always_pass() {
        let policy = policy(StaticCapabilityGate::new()).await;
        let tenant = PrincipalPlane::Tenant {
            tenant_id: Uuid::now_v7(),
        };

        let granted = policy
            .validate(&tenant, Uuid::now_v7(), &scopes(&["openid", "offline_access"]))
            .await
            .unwrap();
        assert_eq!(granted, vec!["openid", "offline_access"]);
    }

    #[tokio::test]
    async fn test_unlisted_namespace_rejected() {
        let policy = policy(StaticCapabilityGate::new()).await;
        let result = policy
            .validate(&PrincipalPlane::System, Uuid::now_v7(), &scopes(&["openid", "admin:all"]))
            .await;
        assert!(matches!(result, Err(AuthError::ScopeNotAllowed(s)) if s == "admin:all"));
    }

    #[tokio::test]
    async fn test_system_skips_tenant_gate() {
        let policy = policy(StaticCapabilityGate::new()).await;
        let granted = policy
            .validate(&PrincipalPlane::System, Uuid::now_v7(), &scopes(&["billing:read"]))
            .await
            .unwrap();
        assert_eq!(granted, vec!["billing:read"]);
    }

    #[tokio::test]
    async fn test_tenant_needs_namespace_capability() {
        let tenant_id = Uuid::now_v7();
        let gate = StaticCapabilityGate::new();
        gate.support(Capability::ScopeNamespace("billing".into())).await;
        gate.set_tenant(tenant_id, Capability::ScopeNamespace("billing".into()), true)
            .await;
        let policy = policy(gate).await;
        let plane = PrincipalPlane::Tenant { tenant_id };

        assert!(policy
            .validate(&plane, Uuid::now_v7(), &scopes(&["billing:read", "billing.write"]))
            .await
            .is_ok());
        assert!(matches!(
            policy
                .validate(&plane, Uuid::now_v7(), &scopes(&["reports:read"]))
                .await,
            Err(AuthError::ScopeNotAllowed(_))
        ));
    }

    #[test]
    fn test_oauth_state_with_pkce() {
        let state = OAuthState::with_pkce();
        assert_eq!(state.state.len(), 32);
        assert_eq!(state.code_verifier.as_ref().map(String::len), Some(64));
        assert_eq!(state.code_challenge().map(|c| c.len()), Some(43));
        assert!(OAuthState::new().code_challenge().is_none());
    }

    #[tokio::test]
    async fn test_state_store_single_use() {
        let store = OAuthStateStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let state = OAuthState::with_pkce()
            .for_tenant(Uuid::now_v7())
            .with_redirect("/dashboard");

        store.save(&state).await.unwrap();
        assert_eq!(store.consume(&state.state).await.unwrap(), Some(state.clone()));
        assert_eq!(store.consume(&state.state).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_store_expiry() {
        let store = OAuthStateStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(1));
        let state = OAuthState::new();
        store.save(&state).await.unwrap();

        tokio::time::advance(OAUTH_STATE_TTL + Duration::from_secs(1)).await;
        assert_eq!(store.consume(&state.state).await.unwrap(), None);
    }
}
