//! JWT token signing and validation
//!
//! This module provides the token signer/validator using the jsonwebtoken
//! crate. An asymmetric key (RS256, RS384, RS512, ES256, ES384) is preferred
//! because it lets resource servers verify tokens with the published public
//! key. An HMAC secret (HS256) is used only when no private key is
//! configured: that mode is a development and availability fallback, not a
//! recommended deployment, and it publishes no verification key.

use crate::claims::{TokenClaims, TokenUse};
use crate::config::{AuthConfig, SigningConfig};
use crate::error::{AuthError, AuthResult};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData,
    Validation,
};
use serde::{Deserialize, Serialize};

/// Clock skew tolerated when checking `exp` and `nbf`.
const VALIDATION_LEEWAY_SECS: u64 = 30;

/// Minimum length of the HMAC fallback secret.
const MIN_SECRET_LEN: usize = 32;

/// Supported JWT algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512
    RS512,
    /// ECDSA using P-256 and SHA-256
    ES256,
    /// ECDSA using P-384 and SHA-384
    ES384,
}

impl JwtAlgorithm {
    /// Whether the algorithm uses a public/private key pair.
    pub fn is_asymmetric(&self) -> bool {
        !matches!(
            self,
            JwtAlgorithm::HS256 | JwtAlgorithm::HS384 | JwtAlgorithm::HS512
        )
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JwtAlgorithm::HS256 => "HS256",
            JwtAlgorithm::HS384 => "HS384",
            JwtAlgorithm::HS512 => "HS512",
            JwtAlgorithm::RS256 => "RS256",
            JwtAlgorithm::RS384 => "RS384",
            JwtAlgorithm::RS512 => "RS512",
            JwtAlgorithm::ES256 => "ES256",
            JwtAlgorithm::ES384 => "ES384",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "HS256" => Some(JwtAlgorithm::HS256),
            "HS384" => Some(JwtAlgorithm::HS384),
            "HS512" => Some(JwtAlgorithm::HS512),
            "RS256" => Some(JwtAlgorithm::RS256),
            "RS384" => Some(JwtAlgorithm::RS384),
            "RS512" => Some(JwtAlgorithm::RS512),
            "ES256" => Some(JwtAlgorithm::ES256),
            "ES384" => Some(JwtAlgorithm::ES384),
            _ => None,
        }
    }
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
            JwtAlgorithm::RS256 => Algorithm::RS256,
            JwtAlgorithm::RS384 => Algorithm::RS384,
            JwtAlgorithm::RS512 => Algorithm::RS512,
            JwtAlgorithm::ES256 => Algorithm::ES256,
            JwtAlgorithm::ES384 => Algorithm::ES384,
        }
    }
}

/// How the signer was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Private key signs, public key verifies and is published
    Asymmetric,

    /// Shared secret; nothing is published
    SymmetricFallback,
}

/// Public verification key, published when asymmetric signing is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationKey {
    /// Key id matching the `kid` header of issued tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Signing algorithm
    pub alg: JwtAlgorithm,

    /// Key use (always `sig`)
    #[serde(rename = "use")]
    pub key_use: String,

    /// Public key in PEM format
    pub public_key_pem: String,
}

/// Token signer and validator.
///
/// Keys are loaded once at construction and never change for the lifetime
/// of the process.
pub struct TokenSigner {
    issuer: String,
    audience: Vec<String>,
    algorithm: JwtAlgorithm,
    mode: SigningMode,
    key_id: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    verification_key: Option<VerificationKey>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .field("mode", &self.mode)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    /// Create a signer from the core configuration.
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        Self::new(config.issuer.clone(), config.audience.clone(), &config.signing)
    }

    /// Create a new signer.
    ///
    /// # Arguments
    ///
    /// * `issuer` - Token issuer
    /// * `audience` - Token audience
    /// * `signing` - Key configuration
    ///
    /// # Returns
    ///
    /// Signer or configuration error
    pub fn new(
        issuer: impl Into<String>,
        audience: Vec<String>,
        signing: &SigningConfig,
    ) -> AuthResult<Self> {
        let issuer = issuer.into();

        if let Some(private_pem) = &signing.private_key_pem {
            let algorithm = signing.algorithm;
            if !algorithm.is_asymmetric() {
                return Err(AuthError::ConfigError(format!(
                    "{} cannot be used with a private key",
                    algorithm.as_str()
                )));
            }
            let public_pem = signing.public_key_pem.as_ref().ok_or_else(|| {
                AuthError::ConfigError("Public key required with a private key".to_string())
            })?;

            let (encoding_key, decoding_key) =
                Self::load_key_pair(algorithm, private_pem, public_pem)?;

            tracing::info!(
                alg = algorithm.as_str(),
                kid = ?signing.key_id,
                "Token signer using asymmetric key"
            );

            return Ok(Self {
                issuer,
                audience,
                algorithm,
                mode: SigningMode::Asymmetric,
                key_id: signing.key_id.clone(),
                encoding_key,
                decoding_key,
                verification_key: Some(VerificationKey {
                    kid: signing.key_id.clone(),
                    alg: algorithm,
                    key_use: "sig".to_string(),
                    public_key_pem: public_pem.clone(),
                }),
            });
        }

        let secret = signing.secret.as_ref().ok_or_else(|| {
            AuthError::ConfigError("No signing key or fallback secret configured".to_string())
        })?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigError(format!(
                "Fallback secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        tracing::warn!(
            "No asymmetric signing key configured; falling back to HS256 shared secret \
             (development mode, no public key published)"
        );

        Ok(Self {
            issuer,
            audience,
            algorithm: JwtAlgorithm::HS256,
            mode: SigningMode::SymmetricFallback,
            key_id: signing.key_id.clone(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            verification_key: None,
        })
    }

    /// Create with a simple secret (HS256 fallback).
    pub fn with_secret(issuer: impl Into<String>, secret: impl Into<String>) -> AuthResult<Self> {
        let issuer = issuer.into();
        let audience = vec![issuer.clone()];
        Self::new(issuer, audience, &SigningConfig::with_secret(secret))
    }

    fn load_key_pair(
        algorithm: JwtAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> AuthResult<(EncodingKey, DecodingKey)> {
        match algorithm {
            JwtAlgorithm::RS256 | JwtAlgorithm::RS384 | JwtAlgorithm::RS512 => {
                let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|e| {
                    AuthError::ConfigError(format!("Invalid RSA private key: {}", e))
                })?;
                let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| AuthError::ConfigError(format!("Invalid RSA public key: {}", e)))?;
                Ok((encoding, decoding))
            }
            JwtAlgorithm::ES256 | JwtAlgorithm::ES384 => {
                let encoding = EncodingKey::from_ec_pem(private_pem.as_bytes())
                    .map_err(|e| AuthError::ConfigError(format!("Invalid EC private key: {}", e)))?;
                let decoding = DecodingKey::from_ec_pem(public_pem.as_bytes())
                    .map_err(|e| AuthError::ConfigError(format!("Invalid EC public key: {}", e)))?;
                Ok((encoding, decoding))
            }
            JwtAlgorithm::HS256 | JwtAlgorithm::HS384 | JwtAlgorithm::HS512 => Err(
                AuthError::ConfigError("HMAC algorithms have no key pair".to_string()),
            ),
        }
    }

    /// Sign claims into a compact JWT.
    pub fn sign(&self, claims: &TokenClaims) -> AuthResult<String> {
        let mut header = Header::new(self.algorithm.into());
        header.kid = self.key_id.clone();
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Validate and decode a token.
    ///
    /// The algorithm is taken from the token header and must equal the
    /// algorithm of the loaded key; no caller hint is consulted. Every
    /// failure collapses into [`AuthError::InvalidToken`].
    ///
    /// # Arguments
    ///
    /// * `token` - The JWT token string
    /// * `expected_use` - Access or ID token
    pub fn validate(&self, token: &str, expected_use: TokenUse) -> AuthResult<TokenClaims> {
        let claims = self.decode_verified(token, true)?;
        if claims.token_use != expected_use {
            return Err(AuthError::InvalidToken("Unexpected token use".to_string()));
        }
        Ok(claims)
    }

    /// Decode a token whose signature is valid, ignoring expiry.
    ///
    /// Used by revocation, where an expired token is a no-op rather than an
    /// error. Never use this to authorize a request.
    pub fn decode_allow_expired(&self, token: &str) -> AuthResult<TokenClaims> {
        self.decode_verified(token, false)
    }

    fn decode_verified(&self, token: &str, check_expiry: bool) -> AuthResult<TokenClaims> {
        let header = decode_header(token)
            .map_err(|_| AuthError::InvalidToken("Malformed token".to_string()))?;

        let expected: Algorithm = self.algorithm.into();
        if header.alg != expected {
            return Err(AuthError::InvalidToken(
                "Unexpected signing algorithm".to_string(),
            ));
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.validate_exp = check_expiry;
        validation.validate_nbf = check_expiry;
        validation.set_issuer(&[&self.issuer]);
        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audience);
        }
        if check_expiry {
            validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        } else {
            validation.set_required_spec_claims(&["sub", "iss"]);
        }

        let token_data: TokenData<TokenClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => "Token expired",
                    jsonwebtoken::errors::ErrorKind::ImmatureSignature => "Token not yet valid",
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => "Invalid signature",
                    jsonwebtoken::errors::ErrorKind::InvalidIssuer => "Invalid issuer",
                    jsonwebtoken::errors::ErrorKind::InvalidAudience => "Invalid audience",
                    jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_) => "Missing claim",
                    _ => "Malformed token",
                };
                AuthError::InvalidToken(reason.to_string())
            })?;

        Ok(token_data.claims)
    }

    /// Public verification key; `None` in symmetric fallback mode.
    pub fn verification_key(&self) -> Option<&VerificationKey> {
        self.verification_key.as_ref()
    }

    /// Signing mode.
    pub fn mode(&self) -> SigningMode {
        self.mode
    }

    /// Algorithm used for every issued token.
    pub fn algorithm(&self) -> JwtAlgorithm {
        self.algorithm
    }

    /// Token issuer.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Token audience.
    pub fn audience(&self) -> &[String] {
        &self.audience
    }
}
