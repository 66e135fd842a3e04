//! Settings for tenants
//!
//! This module provides settings types for configuring per-tenant
//! authentication behavior. Settings control MFA policy and the token
//! lifetimes a tenant wants its principals to receive.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant-level settings.
///
/// These settings control authentication behavior for a tenant.
///
/// # Categories
///
/// - **Security**: MFA requirements, allowed login paths
/// - **Lifetimes**: Access/refresh/ID token TTL overrides and the
///   remember-me profile
///
/// # Examples
///
/// ```
/// use identity_tenant::settings::TenantSettings;
///
/// let settings = TenantSettings::default();
/// assert!(!settings.security.require_mfa);
/// assert!(settings.lifetimes.access_token_ttl_secs.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantSettings {
    /// Owning tenant (absent for settings built in tests or defaults)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,

    /// Security settings
    #[serde(default)]
    pub security: SecuritySettings,

    /// Token lifetime overrides
    #[serde(default)]
    pub lifetimes: TokenLifetimeSettings,
}

impl TenantSettings {
    /// Create empty settings for a tenant.
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Default::default()
        }
    }

    /// Whether the tenant mandates MFA for every principal.
    pub fn mfa_mandatory(&self) -> bool {
        self.security.require_mfa
    }
}

/// Security settings for a tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecuritySettings {
    /// Require multi-factor authentication for all principals of the tenant
    #[serde(default)]
    pub require_mfa: bool,

    /// Allowed email domains for principals (empty = all allowed)
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
}

/// Token lifetime overrides for a tenant.
///
/// Every value is optional; a missing or non-positive value means "no
/// opinion" and lets the next configuration tier decide.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenLifetimeSettings {
    /// Access token TTL in seconds
    #[serde(default)]
    pub access_token_ttl_secs: Option<i64>,

    /// Refresh token TTL in seconds
    #[serde(default)]
    pub refresh_token_ttl_secs: Option<i64>,

    /// ID token TTL in seconds
    #[serde(default)]
    pub id_token_ttl_secs: Option<i64>,

    /// Whether the remember-me profile is enabled for this tenant
    #[serde(default)]
    pub remember_me_enabled: bool,

    /// Access token TTL in seconds when remember-me applies
    #[serde(default)]
    pub remember_me_access_token_ttl_secs: Option<i64>,

    /// Refresh token TTL in seconds when remember-me applies
    #[serde(default)]
    pub remember_me_refresh_token_ttl_secs: Option<i64>,
}
