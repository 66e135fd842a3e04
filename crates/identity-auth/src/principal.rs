//! Principals and credentials
//!
//! A principal lives on exactly one authority plane: the platform-wide
//! SYSTEM plane or a single tenant's TENANT plane. The plane is a sum type,
//! so a TENANT principal without a tenant (or a SYSTEM principal with one)
//! cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Authority plane a principal belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "principal_type", rename_all = "snake_case")]
pub enum PrincipalPlane {
    /// Platform-wide administrator
    System,

    /// Account scoped to exactly one tenant
    Tenant {
        /// Owning tenant
        tenant_id: Uuid,
    },
}

impl PrincipalPlane {
    /// Tenant of the plane, `None` for SYSTEM.
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            PrincipalPlane::System => None,
            PrincipalPlane::Tenant { tenant_id } => Some(*tenant_id),
        }
    }

    /// Plane implied by an optional tenant id.
    pub fn from_tenant(tenant_id: Option<Uuid>) -> Self {
        match tenant_id {
            Some(tenant_id) => PrincipalPlane::Tenant { tenant_id },
            None => PrincipalPlane::System,
        }
    }

    /// Flat principal type.
    pub fn principal_type(&self) -> PrincipalType {
        match self {
            PrincipalPlane::System => PrincipalType::System,
            PrincipalPlane::Tenant { .. } => PrincipalType::Tenant,
        }
    }
}

/// Flat principal type as carried in token claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    /// Platform-wide administrator
    System,

    /// Tenant-scoped account
    #[default]
    Tenant,
}

impl PrincipalType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::System => "SYSTEM",
            PrincipalType::Tenant => "TENANT",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalStatus {
    /// Account can authenticate
    #[default]
    Active,

    /// Account was disabled by an administrator
    Disabled,

    /// Account was locked by an administrator or policy
    Locked,
}

/// Identity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    /// Unique identifier
    pub id: Uuid,

    /// Authority plane
    #[serde(flatten)]
    pub plane: PrincipalPlane,

    /// Login name
    pub username: String,

    /// Email address
    pub email: String,

    /// Account status
    #[serde(default)]
    pub status: PrincipalStatus,

    /// Whether a second factor is required at login
    #[serde(default)]
    pub mfa_enabled: bool,

    /// Encrypted TOTP secret, present only after enrollment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_secret: Option<String>,

    /// Role names (system roles for SYSTEM principals)
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permission strings (system permissions for SYSTEM principals)
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Principal {
    /// Create an active SYSTEM principal.
    pub fn system(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(PrincipalPlane::System, username, email)
    }

    /// Create an active TENANT principal.
    pub fn tenant(tenant_id: Uuid, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(PrincipalPlane::Tenant { tenant_id }, username, email)
    }

    fn new(plane: PrincipalPlane, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            plane,
            username: username.into(),
            email: email.into(),
            status: PrincipalStatus::Active,
            mfa_enabled: false,
            mfa_secret: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    /// Tenant of the principal, `None` for SYSTEM.
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.plane.tenant_id()
    }

    /// Flat principal type.
    pub fn principal_type(&self) -> PrincipalType {
        self.plane.principal_type()
    }

    /// Whether the principal is on the SYSTEM plane.
    pub fn is_system(&self) -> bool {
        matches!(self.plane, PrincipalPlane::System)
    }

    /// Whether the account can authenticate.
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }

    /// Add roles.
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Add permissions.
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set MFA enrollment state.
    pub fn with_mfa(mut self, enabled: bool, secret: Option<String>) -> Self {
        self.mfa_enabled = enabled;
        self.mfa_secret = secret;
        self
    }

    /// Set account status.
    pub fn with_status(mut self, status: PrincipalStatus) -> Self {
        self.status = status;
        self
    }
}

/// Password credential, one per principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    /// Owning principal
    pub user_id: Uuid,

    /// Argon2id PHC string
    pub password_hash: String,

    /// Consecutive failed attempts since the last success
    #[serde(default)]
    pub failed_attempt_count: u32,
}

impl Credential {
    /// Create a credential with a clean failure counter.
    pub fn new(user_id: Uuid, password_hash: impl Into<String>) -> Self {
        Self {
            user_id,
            password_hash: password_hash.into(),
            failed_attempt_count: 0,
        }
    }

    /// Whether the lockout threshold has been reached.
    pub fn is_locked(&self, threshold: u32) -> bool {
        self.failed_attempt_count >= threshold
    }
}
