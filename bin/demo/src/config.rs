//! Demo configuration.
//!
//! Loaded via the `config` crate from environment variables prefixed with
//! `TUPLEGATE`, using `__` to separate nesting levels, for example
//! `TUPLEGATE__AUTHZ__API_URL=http://localhost:8080`.
//!
//! See [`AuthzConfig`] for the authorization settings and their defaults.

use serde::Deserialize;
use tuplegate_authz::AuthzConfig;

/// Demo configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct DemoConfig {
    /// Authorization engine settings.
    pub authz: AuthzConfig,
}

impl DemoConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(
            config::Environment::with_prefix("TUPLEGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_source(
        source: impl config::Source + Send + Sync + 'static,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
