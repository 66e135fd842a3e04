//! MFA challenge verification.

use super::session::{MfaChallenge, MfaSessionManager};
use super::verifier::{MfaCode, MfaVerifier};
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use crate::principal::PrincipalPlane;
use crate::repository::PrincipalRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of a challenge verification.
///
/// The ids are only present when `verified` is true.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MfaVerification {
    /// The code was accepted
    pub verified: bool,

    /// Principal bound to the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Tenant bound to the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
}

impl MfaVerification {
    fn rejected() -> Self {
        Self::default()
    }
}

/// Drives a challenge session through verification.
#[derive(Clone)]
pub struct MfaChallengeService {
    sessions: MfaSessionManager,
    principals: Arc<dyn PrincipalRepository>,
    verifier: Arc<dyn MfaVerifier>,
    timeout: Duration,
}

impl std::fmt::Debug for MfaChallengeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaChallengeService")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl MfaChallengeService {
    /// Create the service.
    pub fn new(
        sessions: MfaSessionManager,
        principals: Arc<dyn PrincipalRepository>,
        verifier: Arc<dyn MfaVerifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            principals,
            verifier,
            timeout,
        }
    }

    /// Session manager backing this service.
    pub fn sessions(&self) -> &MfaSessionManager {
        &self.sessions
    }

    /// Open a challenge for a principal that passed the password step.
    pub async fn create_challenge(
        &self,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> AuthResult<MfaChallenge> {
        self.sessions.create_session(user_id, tenant_id).await
    }

    /// Verify a code against a challenge session.
    ///
    /// The attempt is charged before the code is checked, so an exhausted
    /// session fails with [`AuthError::MaxAttemptsExceeded`] even for a
    /// correct code. A wrong code returns `verified: false` and keeps the
    /// session; a correct one deletes it.
    pub async fn verify_challenge(
        &self,
        session_id: &str,
        code: &MfaCode,
    ) -> AuthResult<MfaVerification> {
        self.sessions.verify_session(session_id).await?;
        let session = self.sessions.increment_attempts(session_id).await?;

        let principal = bounded(
            self.timeout,
            "principal_find_by_id",
            self.principals.find_by_id(session.user_id),
        )
        .await?;

        let principal = match principal {
            Some(p)
                if p.is_active() && p.plane == PrincipalPlane::from_tenant(session.tenant_id) =>
            {
                p
            }
            _ => {
                tracing::warn!(
                    user_id = %session.user_id,
                    "MFA session principal missing, inactive or on another plane"
                );
                self.sessions.delete_session(session_id).await?;
                return Err(AuthError::SessionInvalid);
            }
        };

        if !self.verifier.verify(&principal, code).await? {
            tracing::debug!(
                user_id = %principal.id,
                attempts = session.attempts,
                "MFA code rejected"
            );
            return Ok(MfaVerification::rejected());
        }

        self.sessions.delete_session(session_id).await?;

        if matches!(code, MfaCode::Totp(_)) && !principal.mfa_enabled {
            let mut updated = principal.clone();
            updated.mfa_enabled = true;
            let flip = bounded(
                self.timeout,
                "principal_update",
                self.principals.update(&updated),
            )
            .await;
            if let Err(e) = flip {
                tracing::warn!(
                    user_id = %principal.id,
                    error = %e,
                    "Failed to enable MFA after first verification"
                );
            }
        }

        tracing::info!(
            user_id = %principal.id,
            tenant_id = ?session.tenant_id,
            "MFA challenge verified"
        );

        Ok(MfaVerification {
            verified: true,
            user_id: Some(session.user_id),
            tenant_id: session.tenant_id,
        })
    }
}
