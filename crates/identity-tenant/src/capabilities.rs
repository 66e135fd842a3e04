//! Capabilities and capability verdicts
//!
//! This module defines the named features a capability evaluator can allow or
//! veto for the system or a tenant, and the verdict structure returned for
//! tenant-scoped evaluations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, evaluable feature flag.
///
/// # Examples
///
/// ```
/// use identity_tenant::Capability;
///
/// let cap = Capability::ScopeNamespace("billing".to_string());
/// assert_eq!(cap.key(), "scope:billing");
/// assert_eq!(Capability::parse("oauth2"), Some(Capability::OAuth2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Multi-factor authentication
    Mfa,

    /// OpenID Connect provider features
    Oidc,

    /// OAuth2 authorization hand-off
    OAuth2,

    /// Federation with external identity providers
    Federation,

    /// A custom scope namespace (e.g. `billing` for `billing:read`)
    ScopeNamespace(String),
}

impl Capability {
    /// Get the evaluator key for this capability.
    pub fn key(&self) -> String {
        match self {
            Capability::Mfa => "mfa".to_string(),
            Capability::Oidc => "oidc".to_string(),
            Capability::OAuth2 => "oauth2".to_string(),
            Capability::Federation => "federation".to_string(),
            Capability::ScopeNamespace(ns) => format!("scope:{}", ns),
        }
    }

    /// Parse from an evaluator key.
    ///
    /// # Arguments
    ///
    /// * `s` - Key to parse (case-insensitive for the fixed capabilities)
    ///
    /// # Returns
    ///
    /// `Some(Capability)` if valid, `None` otherwise
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(ns) = s.strip_prefix("scope:") {
            if ns.is_empty() {
                return None;
            }
            return Some(Capability::ScopeNamespace(ns.to_string()));
        }

        match s.to_lowercase().as_str() {
            "mfa" => Some(Capability::Mfa),
            "oidc" => Some(Capability::Oidc),
            "oauth2" | "oauth" => Some(Capability::OAuth2),
            "federation" => Some(Capability::Federation),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Verdict for a tenant-scoped capability evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityEvaluation {
    /// The caller may use the capability right now
    pub can_use: bool,

    /// The tenant's plan or policy allows the capability
    pub tenant_allowed: bool,

    /// The tenant has switched the capability on
    pub tenant_enabled: bool,

    /// Human-readable explanation, usually present on denial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CapabilityEvaluation {
    /// A fully granted evaluation.
    pub fn granted() -> Self {
        Self {
            can_use: true,
            tenant_allowed: true,
            tenant_enabled: true,
            reason: None,
        }
    }

    /// A denied evaluation with a reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_use: false,
            tenant_allowed: false,
            tenant_enabled: false,
            reason: Some(reason.into()),
        }
    }

    /// Whether every flag of the verdict is set.
    pub fn is_fully_granted(&self) -> bool {
        self.can_use && self.tenant_allowed && self.tenant_enabled
    }

    /// Reason to show when the evaluation is not fully granted.
    pub fn denial_reason(&self, capability: &Capability) -> String {
        if let Some(reason) = &self.reason {
            return reason.clone();
        }
        if !self.tenant_allowed {
            format!("{} is not allowed for this tenant", capability)
        } else if !self.tenant_enabled {
            format!("{} is not enabled for this tenant", capability)
        } else {
            format!("{} is not available", capability)
        }
    }
}
