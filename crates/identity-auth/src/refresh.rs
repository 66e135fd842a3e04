//! Opaque refresh tokens.
//!
//! A refresh token is 32 random bytes, URL-safe base64 encoded and handed to
//! the client exactly once. Only its SHA-256 digest is persisted; lookups
//! hash the presented token and compare digests in constant time.

use crate::crypto;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Random bytes in a refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// Refresh token generation and digest helpers.
pub struct RefreshTokens;

impl RefreshTokens {
    /// Generate a new opaque refresh token.
    pub fn generate() -> String {
        crypto::random_token(REFRESH_TOKEN_BYTES)
    }

    /// Digest used as the persisted lookup key.
    pub fn hash(token: &str) -> String {
        crypto::sha256_hex(token)
    }

    /// Check a presented token against a stored digest.
    pub fn verify(token: &str, token_hash: &str) -> bool {
        crypto::constant_time_eq(Self::hash(token).as_bytes(), token_hash.as_bytes())
    }
}

/// Persisted refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    /// Record ID
    pub id: Uuid,

    /// SHA-256 hex digest of the token
    pub token_hash: String,

    /// Owning principal
    pub user_id: Uuid,

    /// Owning tenant for TENANT principals
    pub tenant_id: Option<Uuid>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,

    /// Set once the token has been rotated or revoked
    pub revoked_at: Option<DateTime<Utc>>,

    /// Issued with remember-me
    pub remember_me: bool,

    /// Scope granted to tokens minted from this record
    #[serde(default)]
    pub scope: String,

    /// The authentication that started this chain included a second factor
    #[serde(default)]
    pub mfa_verified: bool,
}

impl RefreshTokenRecord {
    /// Create a record for a freshly generated token.
    pub fn new(
        token: &str,
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        ttl: Duration,
        remember_me: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            token_hash: RefreshTokens::hash(token),
            user_id,
            tenant_id,
            created_at: now,
            expires_at: now + ttl,
            revoked_at: None,
            remember_me,
            scope: String::new(),
            mfa_verified: false,
        }
    }

    /// Set the granted scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set MFA verified status.
    pub fn with_mfa_verified(mut self, verified: bool) -> Self {
        self.mfa_verified = verified;
        self
    }

    /// Whether the record has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Whether the record is past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Seconds until expiry, zero once expired.
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}
