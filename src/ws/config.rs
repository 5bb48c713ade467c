#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use url::Url;

use crate::error::Error;
use crate::{DEFAULT_ENDPOINT, ENDPOINT_VAR, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_millis(2000);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_millis(30_000);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;

/// Configuration for the event-channel client.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Endpoint used by [`ConnectionManager::connect_default`](super::ConnectionManager::connect_default)
    #[builder(into, default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Config {
    /// Build a config for `endpoint`, rejecting anything that is not a `ws`/`wss` URL.
    pub fn for_endpoint(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "endpoint {endpoint} must use the ws or wss scheme"
            )));
        }

        Ok(Self {
            endpoint: url.into(),
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Resolve the endpoint from the environment, falling back to [`DEFAULT_ENDPOINT`].
    pub fn from_env() -> Result<Self> {
        Self::resolve(std::env::var(ENDPOINT_VAR).ok())
    }

    /// Endpoint from an optional override; unset or blank means the default.
    fn resolve(value: Option<String>) -> Result<Self> {
        match value {
            Some(endpoint) if !endpoint.trim().is_empty() => Self::for_endpoint(endpoint.trim()),
            _ => Ok(Self::default()),
        }
    }

    /// Check the parts a builder or struct update can set freely.
    pub fn validate(&self) -> Result<()> {
        self.reconnect.validate()
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor applied per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    /// Reject tuning that would let delays shrink across consecutive failures.
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::validation(format!(
                "backoff multiplier must be a finite value of at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        Ok(())
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            // NaN and shrinking multipliers fall back to a constant delay
            .with_multiplier(config.backoff_multiplier.max(1.0))
            // Delays must be reproducible: min(cap, base * growth^(n-1))
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
