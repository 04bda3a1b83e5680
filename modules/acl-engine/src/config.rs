//! Configuration for the access-control engine.

use std::path::Path;
use std::time::Duration;

use acl_security::{Permissions, PermissionsParseError};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment variables with this prefix override file values,
/// e.g. `ACL_PRIVILEGE_CACHE_TTL_MS=500`.
pub const ENV_PREFIX: &str = "ACL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Lifetime of a cached light-admin privilege set, in milliseconds.
    pub privilege_cache_ttl_ms: u64,

    /// Umask applied to soft permission requests when the session has none,
    /// written like permissions (`"--rwrw"` removes group and world grants).
    pub default_umask: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            privilege_cache_ttl_ms: 10_000,
            default_umask: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid default_umask: {0}")]
    InvalidUmask(#[from] PermissionsParseError),
}

impl SecurityConfig {
    /// Defaults, then the YAML file if given, then `ACL_*` environment variables.
    ///
    /// # Errors
    /// Extraction failures and an unparsable `default_umask`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `ConfigError::InvalidUmask` when `default_umask` does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_umask()?;
        Ok(())
    }

    #[must_use]
    pub fn privilege_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.privilege_cache_ttl_ms)
    }

    /// # Errors
    /// The umask text is not a valid permission string.
    pub fn default_umask(&self) -> Result<Option<Permissions>, PermissionsParseError> {
        self.default_umask.as_deref().map(str::parse).transpose()
    }
}
