//! Authorization context and its configuration form.
//!
//! The context pins the engine endpoint, store, and model version for the
//! lifetime of a client. It is built once and never mutated.

use crate::error::AuthzError;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tuplegate_core::{AuthorizationModelId, StoreId};

/// How fresh the engine's answer to a read must be.
///
/// Writes are always applied by the engine directly. Reads at
/// `MinimizeLatency` may be served from engine-side caches and can lag a
/// preceding `grant` or `revoke` by the engine's cache window.
/// `HigherConsistency` asks the engine to bypass those caches, which is
/// what a caller relying on read-after-write must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Prefer speed; reads may be stale.
    #[default]
    MinimizeLatency,
    /// Prefer fresh reads over speed.
    HigherConsistency,
}

impl Consistency {
    /// Returns the engine's wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinimizeLatency => "MINIMIZE_LATENCY",
            Self::HigherConsistency => "HIGHER_CONSISTENCY",
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authorization configuration as loaded from the environment or a file.
///
/// Fields with defaults can be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    /// Engine base URL (e.g. "http://localhost:8080").
    pub api_url: String,
    /// Store identifier (ULID).
    pub store_id: String,
    /// Authorization model identifier (ULID).
    pub model_id: String,
    /// Bearer token presented to the engine, if it requires one.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Default per-call deadline in milliseconds. 0 disables it.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consistency used for reads unless a call overrides it.
    #[serde(default)]
    pub consistency: Consistency,
    /// The engine's cap on list results, used to flag possible truncation.
    #[serde(default = "default_list_objects_max_results")]
    pub list_objects_max_results: Option<usize>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_list_objects_max_results() -> Option<usize> {
    Some(1000)
}

impl AuthzConfig {
    /// Creates a configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        api_url: impl Into<String>,
        store_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            store_id: store_id.into(),
            model_id: model_id.into(),
            api_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            consistency: Consistency::default(),
            list_objects_max_results: default_list_objects_max_results(),
        }
    }

    /// Validates the configuration into an [`AuthorizationContext`].
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the URL, store id, or model id is malformed.
    pub fn into_context(self) -> Result<AuthorizationContext, Report<AuthzError>> {
        let mut context = AuthorizationContext::new(&self.api_url, &self.store_id, &self.model_id)?
            .with_consistency(self.consistency)
            .with_list_objects_max_results(self.list_objects_max_results);
        context.request_timeout = match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        if let Some(token) = self.api_token.filter(|t| !t.trim().is_empty()) {
            context = context.with_api_token(token);
        }
        Ok(context)
    }
}

/// Process-wide scope of every authorization call.
#[derive(Clone)]
pub struct AuthorizationContext {
    endpoint: reqwest::Url,
    store_id: StoreId,
    model_id: AuthorizationModelId,
    api_token: Option<String>,
    request_timeout: Option<Duration>,
    consistency: Consistency,
    list_objects_max_results: Option<usize>,
}

impl AuthorizationContext {
    /// Creates a context from its three required parts.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the endpoint is not an http(s) URL or
    /// either identifier is not a ULID.
    pub fn new(endpoint: &str, store_id: &str, model_id: &str) -> Result<Self, Report<AuthzError>> {
        let endpoint = reqwest::Url::parse(endpoint.trim()).map_err(|e| {
            AuthzError::Configuration {
                details: format!("invalid engine endpoint '{endpoint}': {e}"),
            }
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AuthzError::Configuration {
                details: format!(
                    "engine endpoint must use http or https, got '{}'",
                    endpoint.scheme()
                ),
            }
            .into());
        }
        if endpoint.host_str().is_none_or(str::is_empty) {
            return Err(AuthzError::Configuration {
                details: format!("engine endpoint '{endpoint}' has no host"),
            }
            .into());
        }

        let store_id: StoreId = store_id.parse().map_err(|e| AuthzError::Configuration {
            details: format!("{e}"),
        })?;
        let model_id: AuthorizationModelId =
            model_id.parse().map_err(|e| AuthzError::Configuration {
                details: format!("{e}"),
            })?;

        Ok(Self {
            endpoint,
            store_id,
            model_id,
            api_token: None,
            request_timeout: Some(Duration::from_millis(default_request_timeout_ms())),
            consistency: Consistency::default(),
            list_objects_max_results: default_list_objects_max_results(),
        })
    }

    /// Sets the bearer token presented to the engine.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the default per-call deadline. `None` disables it.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the default read consistency.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the engine's list result cap used to flag truncation.
    #[must_use]
    pub fn with_list_objects_max_results(mut self, max: Option<usize>) -> Self {
        self.list_objects_max_results = max;
        self
    }

    /// Returns the engine endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    /// Returns the store id.
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Returns the authorization model id.
    #[must_use]
    pub fn model_id(&self) -> AuthorizationModelId {
        self.model_id
    }

    /// Returns the bearer token, if any.
    #[must_use]
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// Returns the default per-call deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Returns the default read consistency.
    #[must_use]
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Returns the engine's list result cap, if known.
    #[must_use]
    pub fn list_objects_max_results(&self) -> Option<usize> {
        self.list_objects_max_results
    }
}

impl fmt::Debug for AuthorizationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationContext")
            .field("endpoint", &self.endpoint.as_str())
            .field("store_id", &self.store_id)
            .field("model_id", &self.model_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("consistency", &self.consistency)
            .field("list_objects_max_results", &self.list_objects_max_results)
            .finish()
    }
}
