//! Error types for authentication operations
//!
//! This module defines all error types that can occur during login, MFA
//! challenges, token issuance, refresh rotation and revocation checks.
//!
//! Credential failures are deliberately collapsed into a single
//! [`AuthError::InvalidCredentials`] so callers cannot learn which factor
//! (user, tenant, password, account state) was wrong.

use identity_store::StoreError;
use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong username, tenant, password, or a disabled account
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account is locked after repeated failures or by an administrator
    #[error("Account is locked")]
    AccountLocked,

    /// MFA is required but not available for this scope
    #[error("MFA unavailable: {0}")]
    MfaUnavailable(String),

    /// A login path was vetoed by the capability gate
    #[error("Capability unavailable: {capability}: {reason}")]
    CapabilityUnavailable {
        /// Capability key
        capability: String,
        /// Human-readable reason from the gate
        reason: String,
    },

    /// Requested OAuth2 scope is not permitted
    #[error("Scope not allowed: {0}")]
    ScopeNotAllowed(String),

    /// MFA session is missing, expired or already consumed
    #[error("MFA session is invalid or expired")]
    SessionInvalid,

    /// MFA session ran out of attempts
    #[error("Maximum attempts exceeded")]
    MaxAttemptsExceeded,

    /// Token is malformed, expired, revoked or has a bad signature
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Refresh token was already rotated or revoked
    #[error("Refresh token has been revoked")]
    RefreshTokenRevoked,

    /// Refresh token is past its expiry
    #[error("Refresh token has expired")]
    RefreshTokenExpired,

    /// Revocation ledger could not answer; callers must deny
    #[error("Revocation status unavailable: {0}")]
    RevocationUnavailable(String),

    /// Collaborator repository failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Ephemeral store failure
    #[error("Store error: {0}")]
    Store(String),

    /// An external call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e.to_string())
    }
}

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Some errors (like invalid credentials) are expected and
    /// should not be logged as errors.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::Repository(_)
                | AuthError::Store(_)
                | AuthError::Timeout(_)
                | AuthError::RevocationUnavailable(_)
                | AuthError::ConfigError(_)
                | AuthError::Internal(_)
        )
    }

    /// Whether the client must restart from login.
    pub fn is_terminal_session_error(&self) -> bool {
        matches!(self, AuthError::SessionInvalid | AuthError::MaxAttemptsExceeded)
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken(_)
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenExpired
            | AuthError::SessionInvalid
            | AuthError::MaxAttemptsExceeded => 401,

            AuthError::AccountLocked => 423,

            AuthError::MfaUnavailable(_)
            | AuthError::CapabilityUnavailable { .. }
            | AuthError::ScopeNotAllowed(_) => 403,

            AuthError::RevocationUnavailable(_) | AuthError::Store(_) => 503,
            AuthError::Timeout(_) => 504,

            AuthError::Repository(_) | AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountLocked => "ACCOUNT_LOCKED",
            AuthError::MfaUnavailable(_) => "MFA_UNAVAILABLE",
            AuthError::CapabilityUnavailable { .. } => "CAPABILITY_UNAVAILABLE",
            AuthError::ScopeNotAllowed(_) => "SCOPE_NOT_ALLOWED",
            AuthError::SessionInvalid => "MFA_SESSION_INVALID",
            AuthError::MaxAttemptsExceeded => "MFA_MAX_ATTEMPTS_EXCEEDED",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::RefreshTokenRevoked => "REFRESH_TOKEN_REVOKED",
            AuthError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthError::RevocationUnavailable(_) => "REVOCATION_UNAVAILABLE",
            AuthError::Repository(_) => "REPOSITORY_ERROR",
            AuthError::Store(_) => "STORE_ERROR",
            AuthError::Timeout(_) => "TIMEOUT",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
