//! Second-factor code verification.
//!
//! TOTP follows RFC 6238 with the parameters every authenticator app
//! defaults to (SHA-1, 6 digits, 30 second step). Recovery codes are
//! one-time and stored as SHA-256 digests.
//!
//! With a replay guard attached, the last accepted time step of each
//! principal is kept in the shared store and a code from that step or an
//! earlier one is refused, even when presented to a different session.

use crate::crypto;
use crate::deadline::bounded;
use crate::error::{AuthError, AuthResult};
use crate::principal::Principal;
use crate::repository::RecoveryCodeRepository;
use async_trait::async_trait;
use identity_store::EphemeralStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use totp_lite::{totp_custom, Sha1};

/// TOTP time step in seconds.
pub const TOTP_STEP_SECS: u64 = 30;

/// TOTP code length.
pub const TOTP_DIGITS: u32 = 6;

const REPLAY_KEY_PREFIX: &str = "mfa:totp_step";

/// Code presented to answer a challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum MfaCode {
    /// Code from an authenticator app
    Totp(String),

    /// One-time recovery code
    Recovery(String),
}

/// Checks a code against a principal's second factor.
#[async_trait]
pub trait MfaVerifier: Send + Sync {
    /// Returns `Ok(false)` for a wrong code; errors are reserved for
    /// infrastructure failures.
    async fn verify(&self, principal: &Principal, code: &MfaCode) -> AuthResult<bool>;
}

/// Encryption of TOTP secrets at rest.
pub trait SecretCipher: Send + Sync {
    /// Encrypt a secret for storage.
    fn encrypt(&self, plaintext: &str) -> AuthResult<String>;

    /// Decrypt a stored secret.
    fn decrypt(&self, ciphertext: &str) -> AuthResult<String>;
}

/// Stores secrets unencrypted. For development and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextSecretCipher;

impl SecretCipher for PlaintextSecretCipher {
    fn encrypt(&self, plaintext: &str) -> AuthResult<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> AuthResult<String> {
        Ok(ciphertext.to_string())
    }
}

/// Normalise a recovery code as typed by a user and digest it.
pub fn recovery_code_hash(code: &str) -> String {
    let normalized: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    crypto::sha256_hex(&normalized)
}

/// Check a TOTP code at a point in time, allowing `skew_steps` steps of
/// clock drift either side.
pub fn verify_totp_at(secret: &[u8], code: &str, unix_secs: u64, skew_steps: u8) -> bool {
    matching_step(secret, code, unix_secs, skew_steps).is_some()
}

/// Time step (`unix_secs / TOTP_STEP_SECS`) a code belongs to, if it
/// matches any step in the skew window.
pub fn matching_step(secret: &[u8], code: &str, unix_secs: u64, skew_steps: u8) -> Option<u64> {
    if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let skew = i64::from(skew_steps);
    let mut matched = None;
    for offset in -skew..=skew {
        let Some(time) = (unix_secs as i64).checked_add(offset * TOTP_STEP_SECS as i64) else {
            continue;
        };
        if time < 0 {
            continue;
        }
        let expected = totp_custom::<Sha1>(TOTP_STEP_SECS, TOTP_DIGITS, secret, time as u64);
        // no early exit so every window costs the same
        if crypto::constant_time_eq(expected.as_bytes(), code.as_bytes()) {
            matched = Some(time as u64 / TOTP_STEP_SECS);
        }
    }
    matched
}

/// TOTP and recovery-code verifier.
#[derive(Clone)]
pub struct TotpVerifier {
    cipher: Arc<dyn SecretCipher>,
    recovery_codes: Arc<dyn RecoveryCodeRepository>,
    replay_guard: Option<Arc<dyn EphemeralStore>>,
    skew_steps: u8,
    timeout: Duration,
}

impl std::fmt::Debug for TotpVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpVerifier")
            .field("skew_steps", &self.skew_steps)
            .field("replay_guard", &self.replay_guard.is_some())
            .finish()
    }
}

impl TotpVerifier {
    /// Create a verifier.
    pub fn new(
        cipher: Arc<dyn SecretCipher>,
        recovery_codes: Arc<dyn RecoveryCodeRepository>,
        skew_steps: u8,
        timeout: Duration,
    ) -> Self {
        Self {
            cipher,
            recovery_codes,
            replay_guard: None,
            skew_steps,
            timeout,
        }
    }

    /// Refuse codes from a time step already accepted for the principal.
    pub fn with_replay_guard(mut self, store: Arc<dyn EphemeralStore>) -> Self {
        self.replay_guard = Some(store);
        self
    }

    fn replay_key(principal: &Principal) -> String {
        format!("{}:{}", REPLAY_KEY_PREFIX, principal.id)
    }

    async fn verify_totp(&self, principal: &Principal, code: &str) -> AuthResult<bool> {
        let Some(stored) = principal.mfa_secret.as_deref() else {
            tracing::debug!(user_id = %principal.id, "TOTP presented but no secret enrolled");
            return Ok(false);
        };

        let encoded = self.cipher.decrypt(stored)?;
        let secret = crypto::base32_decode(&encoded)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AuthError::Internal("Stored TOTP secret is not valid base32".to_string())
            })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AuthError::Internal(format!("System clock before epoch: {}", e)))?
            .as_secs();

        let Some(step) = matching_step(&secret, code.trim(), now, self.skew_steps) else {
            return Ok(false);
        };

        match &self.replay_guard {
            Some(store) => self.claim_step(store.as_ref(), principal, step).await,
            None => Ok(true),
        }
    }

    /// Record `step` as the principal's last accepted step.
    ///
    /// Returns `false` if that step, or a later one, was already accepted.
    async fn claim_step(
        &self,
        store: &dyn EphemeralStore,
        principal: &Principal,
        step: u64,
    ) -> AuthResult<bool> {
        let key = Self::replay_key(principal);
        let last = bounded(self.timeout, "totp_step_get", async {
            store.get(&key).await.map_err(AuthError::from)
        })
        .await?
        .and_then(|raw| raw.parse::<u64>().ok());

        if last.is_some_and(|last| step <= last) {
            tracing::warn!(user_id = %principal.id, step, "TOTP code replayed");
            return Ok(false);
        }

        // long enough to outlive every step the skew window still accepts
        let ttl = Duration::from_secs(TOTP_STEP_SECS * (2 * u64::from(self.skew_steps) + 2));
        bounded(self.timeout, "totp_step_set", async {
            store
                .set_ex(&key, &step.to_string(), ttl)
                .await
                .map_err(AuthError::from)
        })
        .await?;
        Ok(true)
    }
}

#[async_trait]
impl MfaVerifier for TotpVerifier {
    async fn verify(&self, principal: &Principal, code: &MfaCode) -> AuthResult<bool> {
        match code {
            MfaCode::Totp(code) => self.verify_totp(principal, code).await,
            MfaCode::Recovery(code) => {
                let hash = recovery_code_hash(code);
                let consumed = bounded(
                    self.timeout,
                    "recovery_code_consume",
                    self.recovery_codes.verify_and_delete(principal.id, &hash),
                )
                .await?;
                if consumed {
                    tracing::info!(user_id = %principal.id, "Recovery code consumed");
                }
                Ok(consumed)
            }
        }
    }
}
