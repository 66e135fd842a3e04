//! Argon2id password hashing and verification.
//!
//! Hashes are stored as PHC strings so algorithm parameters and salt travel
//! with the hash. Verification is CPU-bound; async callers should use
//! [`verify_password_blocking`], which moves the work off the runtime.

use crate::error::{AuthError, AuthResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash a plaintext password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a plaintext password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch. A hash that cannot be parsed is reported
/// as `Ok(false)` as well, so a corrupted record reads as a failed login
/// rather than leaking an internal error to the caller.
pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is not a valid PHC string");
            return Ok(false);
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!("Password verification failed: {}", e))),
    }
}

/// Verify on the blocking thread pool.
pub async fn verify_password_blocking(password: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))?
}
