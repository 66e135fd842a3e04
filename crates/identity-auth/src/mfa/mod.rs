//! Multi-factor authentication.
//!
//! - [`session`]: attempt-limited, single-use challenge sessions in the
//!   shared ephemeral store
//! - [`verifier`]: TOTP and recovery code checks
//! - [`challenge`]: the verify flow tying sessions, principals and codes
//! - [`enrollment`]: TOTP secret provisioning and recovery code issuance

pub mod challenge;
pub mod enrollment;
pub mod session;
pub mod verifier;

pub use challenge::{MfaChallengeService, MfaVerification};
pub use enrollment::{MfaEnrollment, TotpEnrollment};
pub use session::{MfaChallenge, MfaSession, MfaSessionManager};
pub use verifier::{MfaCode, MfaVerifier, PlaintextSecretCipher, SecretCipher, TotpVerifier};
