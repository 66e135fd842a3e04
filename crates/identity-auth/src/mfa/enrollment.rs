//! TOTP enrollment and recovery code issuance.

use super::verifier::{recovery_code_hash, SecretCipher};
use crate::crypto;
use crate::deadline::bounded;
use crate::error::AuthResult;
use crate::principal::Principal;
use crate::repository::{PrincipalRepository, RecoveryCodeRepository};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Bytes of entropy in a TOTP secret (160 bits, the RFC 4226 recommendation).
const TOTP_SECRET_BYTES: usize = 20;

/// Recovery codes issued per principal.
pub const RECOVERY_CODE_COUNT: usize = 10;

// no 0/O/1/I to keep codes readable
const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Material shown to the user once when TOTP is enrolled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TotpEnrollment {
    /// Base32 secret for manual entry
    pub secret: String,

    /// `otpauth://` URI for QR codes
    pub provisioning_uri: String,
}

/// Enrolls principals into TOTP and issues recovery codes.
#[derive(Clone)]
pub struct MfaEnrollment {
    principals: Arc<dyn PrincipalRepository>,
    recovery_codes: Arc<dyn RecoveryCodeRepository>,
    cipher: Arc<dyn SecretCipher>,
    issuer: String,
    timeout: Duration,
}

impl std::fmt::Debug for MfaEnrollment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaEnrollment")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl MfaEnrollment {
    /// Create the enrollment service.
    pub fn new(
        principals: Arc<dyn PrincipalRepository>,
        recovery_codes: Arc<dyn RecoveryCodeRepository>,
        cipher: Arc<dyn SecretCipher>,
        issuer: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            principals,
            recovery_codes,
            cipher,
            issuer: issuer.into(),
            timeout,
        }
    }

    /// Generate and store a new TOTP secret.
    ///
    /// `mfa_enabled` is left untouched; it flips on the first successful
    /// TOTP verification, which proves the authenticator was set up.
    pub async fn begin(&self, principal: &Principal) -> AuthResult<TotpEnrollment> {
        let secret = crypto::base32_encode(&crypto::random_bytes(TOTP_SECRET_BYTES));

        let mut updated = principal.clone();
        updated.mfa_secret = Some(self.cipher.encrypt(&secret)?);
        bounded(self.timeout, "principal_update", self.principals.update(&updated)).await?;

        tracing::info!(user_id = %principal.id, "TOTP enrollment started");

        Ok(TotpEnrollment {
            provisioning_uri: self.provisioning_uri(&principal.email, &secret),
            secret,
        })
    }

    /// Build the `otpauth://` URI understood by authenticator apps.
    pub fn provisioning_uri(&self, account: &str, secret: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits=6&period=30",
            issuer,
            urlencoding::encode(account),
            secret,
            issuer
        )
    }

    /// Issue a fresh set of recovery codes, invalidating any previous set.
    ///
    /// The plaintext codes are returned once; only digests are stored.
    pub async fn issue_recovery_codes(&self, user_id: Uuid) -> AuthResult<Vec<String>> {
        let codes: Vec<String> = (0..RECOVERY_CODE_COUNT)
            .map(|_| generate_recovery_code())
            .collect();
        let hashes = codes.iter().map(|c| recovery_code_hash(c)).collect();

        bounded(
            self.timeout,
            "recovery_code_replace",
            self.recovery_codes.replace(user_id, hashes),
        )
        .await?;

        tracing::info!(user_id = %user_id, count = codes.len(), "Recovery codes issued");
        Ok(codes)
    }
}

/// `XXXX-XXXX` from an unambiguous alphabet.
fn generate_recovery_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            code.push('-');
        }
        let idx = rng.gen_range(0..RECOVERY_ALPHABET.len());
        code.push(RECOVERY_ALPHABET[idx] as char);
    }
    code
}
