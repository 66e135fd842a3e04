//! Authentication core configuration.
//!
//! Provides the static configuration the core loads once at process start:
//! token issuer and signing keys, lockout policy, MFA session limits, the
//! static lifetime tier and call deadlines. Configuration is loaded from
//! environment variables with sensible defaults for local development.

use crate::jwt::JwtAlgorithm;
use std::time::Duration;

/// Top-level configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token issuer (`iss` claim)
    pub issuer: String,

    /// Token audience (`aud` claim)
    pub audience: Vec<String>,

    /// Signing key configuration
    pub signing: SigningConfig,

    /// Failed attempts before a credential is locked
    pub lockout_threshold: u32,

    /// MFA challenge settings
    pub mfa: MfaConfig,

    /// Static lifetime tier
    pub lifetimes: StaticLifetimeConfig,

    /// Deadline applied to each external call made during a request
    pub call_timeout: Duration,

    /// Scope namespaces that may be granted through the OAuth2 hand-off
    pub allowed_scope_namespaces: Vec<String>,

    /// Scope placed in tokens issued by a direct login
    pub default_scope: String,
}

impl Default for AuthConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            issuer: "identity".to_string(),
            audience: vec!["identity".to_string()],
            signing: SigningConfig::default(),
            lockout_threshold: 5,
            mfa: MfaConfig::default(),
            lifetimes: StaticLifetimeConfig::default(),
            call_timeout: Duration::from_secs(5),
            allowed_scope_namespaces: Vec::new(),
            default_scope: "openid profile email offline_access".to_string(),
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `IDENTITY_ISSUER`: Token issuer (default: identity)
    /// - `IDENTITY_AUDIENCE`: Comma-separated audiences (default: identity)
    /// - `IDENTITY_JWT_PRIVATE_KEY` / `IDENTITY_JWT_PUBLIC_KEY`: PEM key pair
    /// - `IDENTITY_JWT_ALGORITHM`: Asymmetric algorithm (default: RS256)
    /// - `IDENTITY_JWT_KEY_ID`: Key id published with the verification key
    /// - `IDENTITY_JWT_SECRET`: HMAC fallback secret (development only)
    /// - `IDENTITY_LOCKOUT_THRESHOLD`: Failed attempts before lock (default: 5)
    /// - `IDENTITY_MFA_SESSION_TTL_SECS`: MFA session window (default: 300)
    /// - `IDENTITY_MFA_MAX_ATTEMPTS`: MFA attempts per session (default: 5)
    /// - `IDENTITY_CONFIG_*_TTL_SECS`: Static lifetime tier, see [`StaticLifetimeConfig::from_env`]
    /// - `IDENTITY_CALL_TIMEOUT_MS`: Per-call deadline (default: 5000)
    /// - `IDENTITY_ALLOWED_SCOPE_NAMESPACES`: Comma-separated namespaces
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            issuer: std::env::var("IDENTITY_ISSUER").unwrap_or(default.issuer),
            audience: std::env::var("IDENTITY_AUDIENCE")
                .ok()
                .map(|s| split_list(&s))
                .filter(|list| !list.is_empty())
                .unwrap_or(default.audience),
            signing: SigningConfig::from_env(),
            lockout_threshold: env_parse("IDENTITY_LOCKOUT_THRESHOLD")
                .filter(|n| *n > 0)
                .unwrap_or(default.lockout_threshold),
            mfa: MfaConfig::from_env(),
            lifetimes: StaticLifetimeConfig::from_env(),
            call_timeout: env_parse::<u64>("IDENTITY_CALL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.call_timeout),
            allowed_scope_namespaces: std::env::var("IDENTITY_ALLOWED_SCOPE_NAMESPACES")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            default_scope: std::env::var("IDENTITY_DEFAULT_SCOPE").unwrap_or(default.default_scope),
        }
    }
}

/// Signing key configuration.
///
/// An asymmetric key pair is preferred. The HMAC secret is used only when no
/// private key is configured; that mode exists for development and for
/// availability when keys cannot be loaded, and disables the public
/// verification key.
#[derive(Clone)]
pub struct SigningConfig {
    /// Private key (PEM) for RSA/EC algorithms
    pub private_key_pem: Option<String>,

    /// Public key (PEM) for RSA/EC algorithms
    pub public_key_pem: Option<String>,

    /// Asymmetric algorithm to use with the key pair
    pub algorithm: JwtAlgorithm,

    /// Key id placed in token headers and the published verification key
    pub key_id: Option<String>,

    /// HMAC secret for the symmetric fallback
    pub secret: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            private_key_pem: None,
            public_key_pem: None,
            algorithm: JwtAlgorithm::RS256,
            key_id: None,
            secret: None,
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "[REDACTED]"))
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl SigningConfig {
    /// Symmetric-only configuration.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Asymmetric configuration from a PEM key pair.
    pub fn with_key_pair(
        algorithm: JwtAlgorithm,
        private_key_pem: impl Into<String>,
        public_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            private_key_pem: Some(private_key_pem.into()),
            public_key_pem: Some(public_key_pem.into()),
            algorithm,
            ..Default::default()
        }
    }

    /// Load signing configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            private_key_pem: std::env::var("IDENTITY_JWT_PRIVATE_KEY").ok(),
            public_key_pem: std::env::var("IDENTITY_JWT_PUBLIC_KEY").ok(),
            algorithm: std::env::var("IDENTITY_JWT_ALGORITHM")
                .ok()
                .and_then(|s| JwtAlgorithm::parse(&s))
                .filter(|alg| alg.is_asymmetric())
                .unwrap_or(JwtAlgorithm::RS256),
            key_id: std::env::var("IDENTITY_JWT_KEY_ID").ok(),
            secret: std::env::var("IDENTITY_JWT_SECRET").ok(),
        }
    }
}

/// MFA challenge settings.
#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Lifetime of a challenge session
    pub session_ttl: Duration,

    /// Attempts allowed per session
    pub max_attempts: u32,

    /// TOTP steps accepted either side of the current one
    pub totp_skew_steps: u8,

    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(300),
            max_attempts: 5,
            totp_skew_steps: 1,
            totp_issuer: "Identity".to_string(),
        }
    }
}

impl MfaConfig {
    /// Load MFA settings from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            session_ttl: env_parse::<u64>("IDENTITY_MFA_SESSION_TTL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default.session_ttl),
            max_attempts: env_parse("IDENTITY_MFA_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(default.max_attempts),
            totp_skew_steps: env_parse("IDENTITY_MFA_TOTP_SKEW_STEPS")
                .unwrap_or(default.totp_skew_steps),
            totp_issuer: std::env::var("IDENTITY_MFA_TOTP_ISSUER").unwrap_or(default.totp_issuer),
        }
    }
}

/// Static configuration tier of the lifetime cascade.
///
/// All values are in seconds; `None` defers to the hard-coded defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLifetimeConfig {
    /// Access token TTL
    pub access_token_ttl_secs: Option<i64>,

    /// Refresh token TTL
    pub refresh_token_ttl_secs: Option<i64>,

    /// ID token TTL
    pub id_token_ttl_secs: Option<i64>,

    /// Gate for the remember-me values below
    pub remember_me_enabled: bool,

    /// Access token TTL when remember-me applies
    pub remember_me_access_token_ttl_secs: Option<i64>,

    /// Refresh token TTL when remember-me applies
    pub remember_me_refresh_token_ttl_secs: Option<i64>,
}

impl StaticLifetimeConfig {
    /// Load the static tier from environment variables.
    ///
    /// Environment variables:
    /// - `IDENTITY_CONFIG_ACCESS_TOKEN_TTL_SECS`
    /// - `IDENTITY_CONFIG_REFRESH_TOKEN_TTL_SECS`
    /// - `IDENTITY_CONFIG_ID_TOKEN_TTL_SECS`
    /// - `IDENTITY_CONFIG_REMEMBER_ME_ENABLED`
    /// - `IDENTITY_CONFIG_REMEMBER_ME_ACCESS_TOKEN_TTL_SECS`
    /// - `IDENTITY_CONFIG_REMEMBER_ME_REFRESH_TOKEN_TTL_SECS`
    pub fn from_env() -> Self {
        Self {
            access_token_ttl_secs: env_parse("IDENTITY_CONFIG_ACCESS_TOKEN_TTL_SECS"),
            refresh_token_ttl_secs: env_parse("IDENTITY_CONFIG_REFRESH_TOKEN_TTL_SECS"),
            id_token_ttl_secs: env_parse("IDENTITY_CONFIG_ID_TOKEN_TTL_SECS"),
            remember_me_enabled: std::env::var("IDENTITY_CONFIG_REMEMBER_ME_ENABLED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            remember_me_access_token_ttl_secs: env_parse(
                "IDENTITY_CONFIG_REMEMBER_ME_ACCESS_TOKEN_TTL_SECS",
            ),
            remember_me_refresh_token_ttl_secs: env_parse(
                "IDENTITY_CONFIG_REMEMBER_ME_REFRESH_TOKEN_TTL_SECS",
            ),
        }
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
