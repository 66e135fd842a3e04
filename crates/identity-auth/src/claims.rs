//! JWT claims for access and ID tokens
//!
//! This module defines the claim set carried by every signed token the core
//! issues. SYSTEM principals carry `system_roles`/`system_permissions`;
//! TENANT principals carry `roles`/`permissions` and their `tenant_id`.

use crate::principal::{Principal, PrincipalType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signed token claims.
///
/// Optional claims default to empty on decode, so tokens minted before a
/// claim was introduced still validate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    // Standard JWT claims (RFC 7519)
    /// Subject (principal ID)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Audience
    #[serde(default)]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    #[serde(default)]
    pub nbf: i64,

    /// JWT ID, the revocation key
    pub jti: String,

    // Identity claims
    /// Access or ID token
    #[serde(default)]
    pub token_use: TokenUse,

    /// SYSTEM or TENANT
    #[serde(default)]
    pub principal_type: PrincipalType,

    /// Owning tenant for TENANT principals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// Login name
    #[serde(default)]
    pub username: String,

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

    /// Space-separated granted scopes
    #[serde(default)]
    pub scope: String,

    /// Authentication method used
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// A second factor was verified for this authentication
    #[serde(default)]
    pub mfa_verified: bool,
}

impl TokenClaims {
    /// Build claims for a principal.
    ///
    /// # Arguments
    ///
    /// * `principal` - The authenticated principal
    /// * `issuer` - Token issuer
    /// * `audience` - Token audience
    /// * `duration` - Token validity duration
    ///
    /// # Returns
    ///
    /// New access-token claims with a fresh `jti`
    pub fn for_principal(
        principal: &Principal,
        issuer: impl Into<String>,
        audience: Vec<String>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        let exp = now + duration;

        let (roles, permissions, system_roles, system_permissions) = if principal.is_system() {
            (
                Vec::new(),
                Vec::new(),
                principal.roles.clone(),
                principal.permissions.clone(),
            )
        } else {
            (
                principal.roles.clone(),
                principal.permissions.clone(),
                Vec::new(),
                Vec::new(),
            )
        };

        Self {
            sub: principal.id.to_string(),
            iss: issuer.into(),
            aud: audience,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use: TokenUse::Access,
            principal_type: principal.principal_type(),
            tenant_id: principal.tenant_id(),
            email: principal.email.clone(),
            username: principal.username.clone(),
            roles,
            permissions,
            system_roles,
            system_permissions,
            scope: String::new(),
            auth_method: AuthMethod::Password,
            mfa_verified: false,
        }
    }

    /// Get the subject as UUID.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Get expiration as DateTime.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }

    /// Seconds until expiry, zero once expired.
    pub fn remaining_secs(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }

    /// Check whether a scope was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    /// Set the token use.
    pub fn with_token_use(mut self, token_use: TokenUse) -> Self {
        self.token_use = token_use;
        self
    }

    /// Set the granted scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set MFA verified status.
    pub fn with_mfa_verified(mut self, verified: bool) -> Self {
        self.mfa_verified = verified;
        self
    }

    /// Set authentication method.
    pub fn with_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }
}

/// What a signed token is for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    /// Access token presented to resource servers
    #[default]
    Access,

    /// OIDC ID token presented to the client
    Id,
}

/// Authentication method used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Username/password authentication
    #[default]
    Password,

    /// Password followed by a TOTP or recovery code
    PasswordMfa,

    /// Re-issued from a refresh token
    Refresh,
}
