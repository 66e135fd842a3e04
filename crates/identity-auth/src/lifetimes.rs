//! Token lifetime resolution
//!
//! Token TTLs are resolved through an ordered chain of sources:
//!
//! ```text
//! tenant settings -> process environment -> static config -> hard defaults
//! ```
//!
//! Each source either yields a TTL or defers to the next one. Every token
//! kind is resolved independently, and the remember-me variant is its own
//! lookup: a source whose remember-me value is missing defers instead of
//! falling back to its standard value.

use crate::config::{env_parse, StaticLifetimeConfig};
use chrono::Duration;
use identity_tenant::TenantSettings;
use serde::{Deserialize, Serialize};

/// Default access token TTL (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
/// Default remembered access token TTL (60 minutes).
pub const DEFAULT_REMEMBER_ME_ACCESS_TTL_SECS: i64 = 60 * 60;
/// Default refresh token TTL (30 days).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;
/// Default remembered refresh token TTL (90 days).
pub const DEFAULT_REMEMBER_ME_REFRESH_TTL_SECS: i64 = 90 * 24 * 60 * 60;
/// Default ID token TTL (60 minutes).
pub const DEFAULT_ID_TOKEN_TTL_SECS: i64 = 60 * 60;
/// Longest TTL any source may yield (10 years); larger values are unusable.
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Token kinds with independently resolved lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Signed access token
    Access,
    /// Opaque refresh token
    Refresh,
    /// Signed ID token
    Id,
}

/// What a lifetime lookup is for.
#[derive(Debug, Clone, Copy)]
pub struct LifetimeQuery<'a> {
    /// Tenant settings of the principal, if any
    pub tenant_settings: Option<&'a TenantSettings>,
    /// Whether the remember-me profile was requested
    pub remember_me: bool,
    /// Token kind
    pub kind: TokenKind,
}

/// One stage of the lifetime chain.
pub trait LifetimeSource: Send + Sync {
    /// Stage name for diagnostics.
    fn name(&self) -> &'static str;

    /// Yield a TTL in seconds, or `None` to defer to the next stage.
    fn lifetime(&self, query: &LifetimeQuery<'_>) -> Option<i64>;
}

/// Pick the value a stage offers for a query.
///
/// `remember_me_applies` is the stage's own gate; ID tokens have no
/// remember-me variant. Values outside `1..=MAX_TTL_SECS` defer to the
/// next stage.
fn select(
    kind: TokenKind,
    remember_me_applies: bool,
    standard: [Option<i64>; 3],
    remembered: [Option<i64>; 2],
) -> Option<i64> {
    let value = match (kind, remember_me_applies) {
        (TokenKind::Access, false) => standard[0],
        (TokenKind::Refresh, false) => standard[1],
        (TokenKind::Id, _) => standard[2],
        (TokenKind::Access, true) => remembered[0],
        (TokenKind::Refresh, true) => remembered[1],
    };
    value.filter(|secs| (1..=MAX_TTL_SECS).contains(secs))
}

/// Per-tenant settings stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantSettingsSource;

impl LifetimeSource for TenantSettingsSource {
    fn name(&self) -> &'static str {
        "tenant"
    }

    fn lifetime(&self, query: &LifetimeQuery<'_>) -> Option<i64> {
        let lifetimes = &query.tenant_settings?.lifetimes;
        select(
            query.kind,
            query.remember_me && lifetimes.remember_me_enabled,
            [
                lifetimes.access_token_ttl_secs,
                lifetimes.refresh_token_ttl_secs,
                lifetimes.id_token_ttl_secs,
            ],
            [
                lifetimes.remember_me_access_token_ttl_secs,
                lifetimes.remember_me_refresh_token_ttl_secs,
            ],
        )
    }
}

/// Process environment stage.
///
/// The environment is captured once (see [`EnvironmentSource::from_env`]) and
/// treated as immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSource {
    /// `IDENTITY_ACCESS_TOKEN_TTL_SECS`
    pub access_token_ttl_secs: Option<i64>,
    /// `IDENTITY_REFRESH_TOKEN_TTL_SECS`
    pub refresh_token_ttl_secs: Option<i64>,
    /// `IDENTITY_ID_TOKEN_TTL_SECS`
    pub id_token_ttl_secs: Option<i64>,
    /// `IDENTITY_REMEMBER_ME_ACCESS_TOKEN_TTL_SECS`
    pub remember_me_access_token_ttl_secs: Option<i64>,
    /// `IDENTITY_REMEMBER_ME_REFRESH_TOKEN_TTL_SECS`
    pub remember_me_refresh_token_ttl_secs: Option<i64>,
}

impl EnvironmentSource {
    /// Snapshot the lifetime variables of the process environment.
    pub fn from_env() -> Self {
        Self {
            access_token_ttl_secs: env_parse("IDENTITY_ACCESS_TOKEN_TTL_SECS"),
            refresh_token_ttl_secs: env_parse("IDENTITY_REFRESH_TOKEN_TTL_SECS"),
            id_token_ttl_secs: env_parse("IDENTITY_ID_TOKEN_TTL_SECS"),
            remember_me_access_token_ttl_secs: env_parse(
                "IDENTITY_REMEMBER_ME_ACCESS_TOKEN_TTL_SECS",
            ),
            remember_me_refresh_token_ttl_secs: env_parse(
                "IDENTITY_REMEMBER_ME_REFRESH_TOKEN_TTL_SECS",
            ),
        }
    }
}

impl LifetimeSource for EnvironmentSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn lifetime(&self, query: &LifetimeQuery<'_>) -> Option<i64> {
        select(
            query.kind,
            query.remember_me,
            [
                self.access_token_ttl_secs,
                self.refresh_token_ttl_secs,
                self.id_token_ttl_secs,
            ],
            [
                self.remember_me_access_token_ttl_secs,
                self.remember_me_refresh_token_ttl_secs,
            ],
        )
    }
}

/// Static configuration stage.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    config: StaticLifetimeConfig,
}

impl StaticConfigSource {
    /// Create from loaded configuration.
    pub fn new(config: StaticLifetimeConfig) -> Self {
        Self { config }
    }
}

impl LifetimeSource for StaticConfigSource {
    fn name(&self) -> &'static str {
        "config"
    }

    fn lifetime(&self, query: &LifetimeQuery<'_>) -> Option<i64> {
        select(
            query.kind,
            query.remember_me && self.config.remember_me_enabled,
            [
                self.config.access_token_ttl_secs,
                self.config.refresh_token_ttl_secs,
                self.config.id_token_ttl_secs,
            ],
            [
                self.config.remember_me_access_token_ttl_secs,
                self.config.remember_me_refresh_token_ttl_secs,
            ],
        )
    }
}

/// Hard-coded defaults; always yields.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSource;

impl LifetimeSource for DefaultSource {
    fn name(&self) -> &'static str {
        "default"
    }

    fn lifetime(&self, query: &LifetimeQuery<'_>) -> Option<i64> {
        select(
            query.kind,
            query.remember_me,
            [
                Some(DEFAULT_ACCESS_TTL_SECS),
                Some(DEFAULT_REFRESH_TTL_SECS),
                Some(DEFAULT_ID_TOKEN_TTL_SECS),
            ],
            [
                Some(DEFAULT_REMEMBER_ME_ACCESS_TTL_SECS),
                Some(DEFAULT_REMEMBER_ME_REFRESH_TTL_SECS),
            ],
        )
    }
}

/// Resolved lifetimes for one issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLifetimes {
    /// Access token TTL in seconds
    pub access_ttl_secs: i64,
    /// Refresh token TTL in seconds
    pub refresh_ttl_secs: i64,
    /// ID token TTL in seconds
    pub id_ttl_secs: i64,
}

impl TokenLifetimes {
    /// Access token TTL.
    pub fn access(&self) -> Duration {
        Duration::seconds(self.access_ttl_secs)
    }

    /// Refresh token TTL.
    pub fn refresh(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_secs)
    }

    /// ID token TTL.
    pub fn id(&self) -> Duration {
        Duration::seconds(self.id_ttl_secs)
    }
}

/// Ordered chain of lifetime sources.
///
/// Built once at process start and shared read-only.
pub struct LifetimeResolver {
    sources: Vec<Box<dyn LifetimeSource>>,
}

impl std::fmt::Debug for LifetimeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("LifetimeResolver")
            .field("sources", &names)
            .finish()
    }
}

impl LifetimeResolver {
    /// Standard chain: tenant, environment snapshot, static config, defaults.
    pub fn new(environment: EnvironmentSource, config: StaticLifetimeConfig) -> Self {
        Self::with_sources(vec![
            Box::new(TenantSettingsSource),
            Box::new(environment),
            Box::new(StaticConfigSource::new(config)),
        ])
    }

    /// Chain over the given sources; [`DefaultSource`] is always appended.
    pub fn with_sources(mut sources: Vec<Box<dyn LifetimeSource>>) -> Self {
        sources.push(Box::new(DefaultSource));
        Self { sources }
    }

    /// Resolve one token kind.
    pub fn resolve_kind(&self, query: &LifetimeQuery<'_>) -> i64 {
        for source in &self.sources {
            if let Some(secs) = source.lifetime(query) {
                tracing::trace!(
                    source = source.name(),
                    kind = ?query.kind,
                    ttl_secs = secs,
                    "Resolved token lifetime"
                );
                return secs;
            }
        }
        // unreachable while DefaultSource terminates the chain
        match query.kind {
            TokenKind::Access => DEFAULT_ACCESS_TTL_SECS,
            TokenKind::Refresh => DEFAULT_REFRESH_TTL_SECS,
            TokenKind::Id => DEFAULT_ID_TOKEN_TTL_SECS,
        }
    }

    /// Resolve access, refresh and ID token lifetimes.
    pub fn resolve(
        &self,
        tenant_settings: Option<&TenantSettings>,
        remember_me: bool,
    ) -> TokenLifetimes {
        let query = |kind| LifetimeQuery {
            tenant_settings,
            remember_me,
            kind,
        };

        TokenLifetimes {
            access_ttl_secs: self.resolve_kind(&query(TokenKind::Access)),
            refresh_ttl_secs: self.resolve_kind(&query(TokenKind::Refresh)),
            id_ttl_secs: self.resolve_kind(&query(TokenKind::Id)),
        }
    }
}

impl Default for LifetimeResolver {
    fn default() -> Self {
        Self::new(EnvironmentSource::default(), StaticLifetimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_tenant::TokenLifetimeSettings;

    fn tenant(lifetimes: TokenLifetimeSettings) -> TenantSettings {
        TenantSettings {
            lifetimes,
            ..Default::default()
        }
    }

    fn env_all() -> EnvironmentSource {
        EnvironmentSource {
            access_token_ttl_secs: Some(200),
            refresh_token_ttl_secs: Some(2000),
            id_token_ttl_secs: Some(300),
            remember_me_access_token_ttl_secs: Some(400),
            remember_me_refresh_token_ttl_secs: Some(4000),
        }
    }

    fn config_all() -> StaticLifetimeConfig {
        StaticLifetimeConfig {
            access_token_ttl_secs: Some(20),
            refresh_token_ttl_secs: Some(200_000),
            id_token_ttl_secs: Some(30),
            remember_me_enabled: true,
            remember_me_access_token_ttl_secs: Some(40),
            remember_me_refresh_token_ttl_secs: Some(400_000),
        }
    }

    #[test]
    fn test_hard_defaults() {
        let resolver = LifetimeResolver::default();

        let standard = resolver.resolve(None, false);
        assert_eq!(standard.access_ttl_secs, 15 * 60);
        assert_eq!(standard.refresh_ttl_secs, 30 * 86_400);
        assert_eq!(standard.id_ttl_secs, 60 * 60);

        let remembered = resolver.resolve(None, true);
        assert_eq!(remembered.access_ttl_secs, 60 * 60);
        assert_eq!(remembered.refresh_ttl_secs, 90 * 86_400);
        assert_eq!(remembered.id_ttl_secs, 60 * 60);
    }

    #[test]
    fn test_tenant_overrides_environment() {
        let resolver = LifetimeResolver::new(env_all(), config_all());
        let settings = tenant(TokenLifetimeSettings {
            access_token_ttl_secs: Some(100),
            ..Default::default()
        });

        let lifetimes = resolver.resolve(Some(&settings), false);
        assert_eq!(lifetimes.access_ttl_secs, 100);
        // tenant has no refresh/id opinion; environment decides
        assert_eq!(lifetimes.refresh_ttl_secs, 2000);
        assert_eq!(lifetimes.id_ttl_secs, 300);
    }

    #[test]
    fn test_environment_overrides_config() {
        let resolver = LifetimeResolver::new(env_all(), config_all());
        let lifetimes = resolver.resolve(None, false);
        assert_eq!(lifetimes.access_ttl_secs, 200);

        let remembered = resolver.resolve(None, true);
        assert_eq!(remembered.access_ttl_secs, 400);
        assert_eq!(remembered.refresh_ttl_secs, 4000);
    }

    #[test]
    fn test_config_overrides_defaults() {
        let resolver = LifetimeResolver::new(EnvironmentSource::default(), config_all());
        let lifetimes = resolver.resolve(None, false);
        assert_eq!(lifetimes.access_ttl_secs, 20);
        assert_eq!(lifetimes.id_ttl_secs, 30);

        let remembered = resolver.resolve(None, true);
        assert_eq!(remembered.access_ttl_secs, 40);
        assert_eq!(remembered.refresh_ttl_secs, 400_000);
    }

    #[test]
    fn test_config_remember_me_gate() {
        let mut config = config_all();
        config.remember_me_enabled = false;
        let resolver = LifetimeResolver::new(EnvironmentSource::default(), config);

        // gate closed: the standard config values apply to a remember-me login
        let remembered = resolver.resolve(None, true);
        assert_eq!(remembered.access_ttl_secs, 20);
        assert_eq!(remembered.refresh_ttl_secs, 200_000);
        assert_eq!(remembered.id_ttl_secs, 30);

        // with no standard values either, the remembered defaults apply
        let resolver = LifetimeResolver::new(
            EnvironmentSource::default(),
            StaticLifetimeConfig::default(),
        );
        let remembered = resolver.resolve(None, true);
        assert_eq!(remembered.access_ttl_secs, DEFAULT_REMEMBER_ME_ACCESS_TTL_SECS);
        assert_eq!(remembered.refresh_ttl_secs, DEFAULT_REMEMBER_ME_REFRESH_TTL_SECS);
    }

    #[test]
    fn test_tenant_remember_me_requires_enabled_flag() {
        let resolver = LifetimeResolver::default();
        let mut settings = tenant(TokenLifetimeSettings {
            access_token_ttl_secs: Some(111),
            remember_me_access_token_ttl_secs: Some(999),
            remember_me_enabled: false,
            ..Default::default()
        });

        assert_eq!(resolver.resolve(Some(&settings), true).access_ttl_secs, 111);

        settings.lifetimes.remember_me_enabled = true;
        assert_eq!(resolver.resolve(Some(&settings), true).access_ttl_secs, 999);
        assert_eq!(resolver.resolve(Some(&settings), false).access_ttl_secs, 111);
    }

    #[test]
    fn test_remember_me_variant_is_independent() {
        let resolver = LifetimeResolver::new(env_all(), config_all());
        let settings = tenant(TokenLifetimeSettings {
            access_token_ttl_secs: Some(111),
            remember_me_enabled: true,
            remember_me_refresh_token_ttl_secs: Some(7777),
            ..Default::default()
        });

        let remembered = resolver.resolve(Some(&settings), true);
        // tenant has no remembered access value: environment's remembered value wins
        assert_eq!(remembered.access_ttl_secs, 400);
        assert_eq!(remembered.refresh_ttl_secs, 7777);
    }

    #[test]
    fn test_non_positive_values_are_unusable() {
        let resolver = LifetimeResolver::default();
        let settings = tenant(TokenLifetimeSettings {
            access_token_ttl_secs: Some(0),
            refresh_token_ttl_secs: Some(-5),
            ..Default::default()
        });

        let lifetimes = resolver.resolve(Some(&settings), false);
        assert_eq!(lifetimes.access_ttl_secs, DEFAULT_ACCESS_TTL_SECS);
        assert_eq!(lifetimes.refresh_ttl_secs, DEFAULT_REFRESH_TTL_SECS);
    }

    #[test]
    fn test_oversized_values_are_unusable() {
        let env = EnvironmentSource {
            access_token_ttl_secs: Some(i64::MAX),
            ..Default::default()
        };
        let resolver = LifetimeResolver::new(env, StaticLifetimeConfig::default());
        let settings = tenant(TokenLifetimeSettings {
            refresh_token_ttl_secs: Some(10_000_000_000_000),
            id_token_ttl_secs: Some(MAX_TTL_SECS),
            ..Default::default()
        });

        let lifetimes = resolver.resolve(Some(&settings), false);
        assert_eq!(lifetimes.access_ttl_secs, DEFAULT_ACCESS_TTL_SECS);
        assert_eq!(lifetimes.refresh_ttl_secs, DEFAULT_REFRESH_TTL_SECS);
        assert_eq!(lifetimes.id_ttl_secs, MAX_TTL_SECS);

        // the ceiling still fits a chrono timestamp
        let _ = chrono::Utc::now() + lifetimes.id();
    }

    #[test]
    fn test_environment_snapshot() {
        temp_env::with_vars(
            [
                ("IDENTITY_ACCESS_TOKEN_TTL_SECS", Some("321")),
                ("IDENTITY_REMEMBER_ME_REFRESH_TOKEN_TTL_SECS", Some("not-a-number")),
            ],
            || {
                let env = EnvironmentSource::from_env();
                assert_eq!(env.access_token_ttl_secs, Some(321));
                assert_eq!(env.remember_me_refresh_token_ttl_secs, None);
            },
        );
    }

    #[test]
    fn test_durations() {
        let lifetimes = LifetimeResolver::default().resolve(None, false);
        assert_eq!(lifetimes.access(), Duration::minutes(15));
        assert_eq!(lifetimes.refresh(), Duration::days(30));
        assert_eq!(lifetimes.id(), Duration::hours(1));
    }
}
