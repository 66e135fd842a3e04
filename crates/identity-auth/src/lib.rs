//! # Identity Authentication
//!
//! This crate provides the authentication core of the multi-tenant identity
//! provider: password login on two isolated principal planes, TOTP-based
//! MFA challenges, and the lifecycle of the tokens it issues.
//!
//! ## Overview
//!
//! The identity-auth crate handles:
//! - **Login**: Plane-scoped principal resolution, lockout and password checks
//! - **MFA**: Attempt-limited challenge sessions, TOTP and recovery codes
//! - **Tokens**: Signed access/ID tokens, one-time refresh tokens, revocation
//! - **OAuth2 hand-off**: Scope validation and acceptance through an external
//!   authorization server
//!
//! ## Planes
//!
//! SYSTEM principals operate the platform and have no tenant; TENANT
//! principals belong to exactly one tenant. A login names its plane with the
//! presence or absence of a tenant id and never falls back to the other one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use identity_auth::{
//!     AuthConfig, LoginOrchestrator, LoginOutcome, LoginRequest, MemoryRepositories,
//!     PlaintextSecretCipher, StaticCapabilityGate,
//! };
//! use identity_store::MemoryStore;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! async fn example() -> identity_auth::AuthResult<()> {
//!     let repos = MemoryRepositories::new();
//!     let login = LoginOrchestrator::from_config(
//!         AuthConfig::from_env(),
//!         repos.repositories(),
//!         Arc::new(StaticCapabilityGate::new()),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(PlaintextSecretCipher),
//!     )?;
//!
//!     let tenant_id = Uuid::now_v7();
//!     match login.login(LoginRequest::tenant(tenant_id, "alice", "secret")).await? {
//!         LoginOutcome::Tokens(bundle) => {
//!             let claims = login.tokens().authenticate(&bundle.access_token).await?;
//!             assert_eq!(claims.tenant_id, Some(tenant_id));
//!         }
//!         LoginOutcome::MfaRequired(marker) => println!("verify {}", marker.session_id),
//!         LoginOutcome::Redirect { redirect_to } => println!("go to {}", redirect_to),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Signing
//!
//! Tokens are signed with the configured asymmetric key, whose public half
//! is exposed through [`TokenService::verification_key`]. Without one the
//! signer falls back to an HS256 shared secret. That mode exists so
//! development setups keep working; it is not a recommended deployment.
//!
//! ## Collaborators
//!
//! This crate integrates with:
//! - `identity-tenant`: Tenant settings and capability keys
//! - `identity-store`: Shared ephemeral store for MFA sessions, revocation
//!   and OAuth state

pub mod capability;
pub mod claims;
pub mod config;
pub mod crypto;
pub mod deadline;
pub mod error;
pub mod jwt;
pub mod lifetimes;
pub mod login;
pub mod memory;
pub mod mfa;
pub mod oauth;
pub mod password;
pub mod principal;
pub mod refresh;
pub mod repository;
pub mod revocation;
pub mod tokens;

// Re-export main types
pub use capability::{CapabilityCheck, CapabilityGate, StaticCapabilityGate};
pub use claims::{AuthMethod, TokenClaims, TokenUse};
pub use config::{AuthConfig, MfaConfig, SigningConfig, StaticLifetimeConfig};
pub use error::{AuthError, AuthResult};
pub use jwt::{JwtAlgorithm, SigningMode, TokenSigner, VerificationKey};
pub use lifetimes::{LifetimeResolver, LifetimeSource, TokenKind, TokenLifetimes};
pub use login::{LoginOrchestrator, LoginOutcome, LoginRequest, MfaLoginRequest, MfaRequired};
pub use memory::MemoryRepositories;
pub use mfa::{
    MfaChallenge, MfaChallengeService, MfaCode, MfaEnrollment, MfaVerification, MfaVerifier,
    PlaintextSecretCipher, SecretCipher, TotpEnrollment, TotpVerifier,
};
pub use oauth::{
    AuthorizationServer, OAuthLoginAcceptance, OAuthLoginRequest, OAuthState, OAuthStateStore,
    ScopePolicy,
};
pub use principal::{Credential, Principal, PrincipalPlane, PrincipalStatus, PrincipalType};
pub use refresh::{RefreshTokenRecord, RefreshTokens};
pub use repository::{
    CredentialRepository, PrincipalRepository, RecoveryCodeRepository, RefreshTokenRepository,
    Repositories, TenantSettingsRepository,
};
pub use revocation::{RevocationLedger, RevocationStatus};
pub use tokens::{IntrospectionResponse, TokenBundle, TokenService, TokenTypeHint};
