//! # Identity Tenant Policy
//!
//! This crate provides the tenant-level policy data consumed by the
//! authentication core.
//!
//! ## Overview
//!
//! The identity-tenant crate handles:
//! - **Settings**: Per-tenant security policy (mandatory MFA) and token
//!   lifetime overrides, including the remember-me profile
//! - **Capabilities**: The named feature flags (MFA, OIDC, OAuth2, federation,
//!   scope namespaces) a capability evaluator rules on, and the verdict shape
//!   it returns
//!
//! ## Architecture
//!
//! ```text
//! Tenant
//!   ├─ TenantSettings
//!   │     ├─ SecuritySettings (require_mfa, ...)
//!   │     └─ TokenLifetimeSettings (standard + remember-me TTLs)
//!   └─ Capability evaluations (external rule engine)
//!         └─ CapabilityEvaluation { can_use, tenant_allowed, tenant_enabled, reason }
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use identity_tenant::{Capability, TenantSettings};
//!
//! let mut settings = TenantSettings::default();
//! settings.security.require_mfa = true;
//! settings.lifetimes.access_token_ttl_secs = Some(600);
//!
//! assert_eq!(Capability::Mfa.key(), "mfa");
//! assert_eq!(
//!     Capability::parse("scope:billing"),
//!     Some(Capability::ScopeNamespace("billing".into()))
//! );
//! ```
//!
//! ## Cross-Crate Integration
//!
//! This crate is designed to work with:
//! - `identity-auth`: Lifetime resolution and the capability gate boundary
//! - `identity-store`: Nothing directly; settings are loaded by repositories

pub mod capabilities;
pub mod settings;

// Re-export main types for convenience
pub use capabilities::{Capability, CapabilityEvaluation};
pub use settings::{SecuritySettings, TenantSettings, TokenLifetimeSettings};
