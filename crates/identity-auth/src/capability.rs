//! Capability gate boundary.
//!
//! The rule engine that decides whether a tenant may use a feature lives
//! outside this crate. The core consumes it through [`CapabilityGate`] and
//! always goes through [`CapabilityCheck`], which turns evaluator errors and
//! timeouts into denials so a broken evaluator can never grant anything.

use crate::deadline::bounded;
use crate::error::AuthResult;
use crate::principal::PrincipalPlane;
use async_trait::async_trait;
use identity_tenant::{Capability, CapabilityEvaluation};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// External capability evaluator.
#[async_trait]
pub trait CapabilityGate: Send + Sync {
    /// Evaluate a capability for a tenant (and optionally a specific user).
    async fn evaluate(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        capability: &Capability,
    ) -> AuthResult<CapabilityEvaluation>;

    /// Whether the platform supports a capability at all (SYSTEM plane).
    async fn is_supported(&self, capability: &Capability) -> AuthResult<bool>;
}

/// Fail-closed wrapper around a [`CapabilityGate`].
#[derive(Clone)]
pub struct CapabilityCheck {
    gate: Arc<dyn CapabilityGate>,
    timeout: Duration,
}

impl std::fmt::Debug for CapabilityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCheck")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CapabilityCheck {
    /// Wrap a gate with a per-call deadline.
    pub fn new(gate: Arc<dyn CapabilityGate>, timeout: Duration) -> Self {
        Self { gate, timeout }
    }

    /// Check a capability for a principal plane.
    ///
    /// TENANT principals need a full grant from `evaluate`; SYSTEM principals
    /// need `is_supported`. Returns the denial reason on `Err`.
    pub async fn check(
        &self,
        plane: &PrincipalPlane,
        user_id: Uuid,
        capability: &Capability,
    ) -> Result<(), String> {
        match plane {
            PrincipalPlane::Tenant { tenant_id } => {
                let evaluation = bounded(
                    self.timeout,
                    "capability_evaluate",
                    self.gate.evaluate(*tenant_id, Some(user_id), capability),
                )
                .await;

                match evaluation {
                    Ok(evaluation) if evaluation.is_fully_granted() => Ok(()),
                    Ok(evaluation) => {
                        let reason = evaluation.denial_reason(capability);
                        tracing::debug!(
                            tenant_id = %tenant_id,
                            capability = %capability,
                            reason = %reason,
                            "Capability denied"
                        );
                        Err(reason)
                    }
                    Err(e) => {
                        tracing::warn!(
                            tenant_id = %tenant_id,
                            capability = %capability,
                            error = %e,
                            "Capability evaluation failed; denying"
                        );
                        Err(format!("{} could not be evaluated", capability))
                    }
                }
            }
            PrincipalPlane::System => {
                let supported = bounded(
                    self.timeout,
                    "capability_is_supported",
                    self.gate.is_supported(capability),
                )
                .await;

                match supported {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(format!("{} is not supported", capability)),
                    Err(e) => {
                        tracing::warn!(
                            capability = %capability,
                            error = %e,
                            "Capability support check failed; denying"
                        );
                        Err(format!("{} could not be evaluated", capability))
                    }
                }
            }
        }
    }
}

/// In-process capability gate with fixed rules.
///
/// A capability must be platform-supported before any tenant can use it.
/// Each tenant then either allows it (enabled or not) or has no entry, which
/// reads as not allowed.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityGate {
    supported: Arc<RwLock<HashSet<Capability>>>,
    tenants: Arc<RwLock<HashMap<Uuid, HashMap<Capability, bool>>>>,
}

impl StaticCapabilityGate {
    /// Create a gate that supports nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a capability as platform-supported.
    pub async fn support(&self, capability: Capability) {
        self.supported.write().await.insert(capability);
    }

    /// Allow a capability for a tenant, enabled or disabled.
    pub async fn set_tenant(&self, tenant_id: Uuid, capability: Capability, enabled: bool) {
        self.tenants
            .write()
            .await
            .entry(tenant_id)
            .or_default()
            .insert(capability, enabled);
    }
}

#[async_trait]
impl CapabilityGate for StaticCapabilityGate {
    async fn evaluate(
        &self,
        tenant_id: Uuid,
        _user_id: Option<Uuid>,
        capability: &Capability,
    ) -> AuthResult<CapabilityEvaluation> {
        let can_use = self.supported.read().await.contains(capability);
        let entry = self
            .tenants
            .read()
            .await
            .get(&tenant_id)
            .and_then(|caps| caps.get(capability).copied());

        let evaluation = CapabilityEvaluation {
            can_use,
            tenant_allowed: entry.is_some(),
            tenant_enabled: entry.unwrap_or(false),
            reason: None,
        };
        Ok(evaluation)
    }

    async fn is_supported(&self, capability: &Capability) -> AuthResult<bool> {
        Ok(self.supported.read().await.contains(capability))
    }
}
