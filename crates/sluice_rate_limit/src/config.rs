//! TOML configuration for the broker, retry policy and resources.
//!
//! Sources, later overriding earlier:
//! - bundled defaults (`sluice.toml` compiled into the crate)
//! - `~/.config/sluice/sluice.toml`
//! - `./sluice.toml`

use config::{Config, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use sluice_core::{RateLimitConfig, RetryConfig};
use sluice_error::{ConfigError, SluiceError, SluiceResult};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Broker-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BrokerSettings {
    /// Default queue capacity per resource
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Default grace period for `shutdown`
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_max_queue_size() -> usize {
    1_000
}

fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

/// Per-resource retry overrides. Unset fields fall back to `[retry]`.
///
/// ```toml
/// [resources.llm.retry]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct RetryOverride {
    /// Retries after the first attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Delay before the first retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    /// Cap on the computed delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Jitter fraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_ratio: Option<f64>,
}

impl RetryOverride {
    /// Applies the overrides on top of `base`.
    pub fn apply(&self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter_ratio: self.jitter_ratio.unwrap_or(base.jitter_ratio),
        }
    }
}

/// Raw `[resources.<name>]` table.
///
/// ```toml
/// [resources.llm]
/// requests_per_window = 60
/// window_ms = 60_000
/// cost_per_window = 90_000
/// max_concurrent = 2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ResourceSettings {
    /// Requests admitted per window
    pub requests_per_window: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Cost units admitted per window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_window: Option<u64>,
    /// Executions in flight at once (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,
    /// Queue capacity (defaults to `[broker] max_queue_size`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
    /// Retry overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
}

impl ResourceSettings {
    /// Rate limit portion of the table.
    pub fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: self.requests_per_window,
            window_ms: self.window_ms,
            cost_per_window: self.cost_per_window,
        }
    }
}

/// Resource settings merged with broker-wide defaults.
#[derive(Debug, Clone, Copy, PartialEq, Getters)]
pub struct ResourceProfile {
    /// Admission limits
    rate_limits: RateLimitConfig,
    /// Effective retry policy
    retry: RetryConfig,
    /// Executions in flight at once
    max_concurrent: u32,
    /// Queue capacity
    max_queue_size: usize,
}

/// Top-level Sluice configuration.
///
/// # Example
///
/// ```no_run
/// use sluice_rate_limit::SluiceConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SluiceConfig::load()?;
/// if let Some(llm) = config.resource("llm") {
///     println!("llm requests per window: {}", llm.rate_limits().requests_per_window);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct SluiceConfig {
    /// Broker-wide settings
    #[serde(default)]
    pub broker: BrokerSettings,
    /// Default retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Resource name to settings
    #[serde(default)]
    pub resources: HashMap<String, ResourceSettings>,
}

impl SluiceConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> SluiceResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                SluiceError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                SluiceError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Load bundled defaults overlaid with user configuration files.
    ///
    /// Missing user files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed.
    #[instrument]
    pub fn load() -> SluiceResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../sluice.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/sluice/sluice.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("sluice").required(false));

        builder
            .build()
            .map_err(|e| {
                SluiceError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                SluiceError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Effective settings for `name`, or `None` if it is not configured.
    #[instrument(skip(self))]
    pub fn resource(&self, name: &str) -> Option<ResourceProfile> {
        let settings = self.resources.get(name)?;
        debug!("Resolving resource profile");

        let retry = settings
            .retry
            .map_or(self.retry, |overrides| overrides.apply(self.retry));

        Some(ResourceProfile {
            rate_limits: settings.rate_limits(),
            retry,
            max_concurrent: settings.max_concurrent.unwrap_or(1),
            max_queue_size: settings
                .max_queue_size
                .unwrap_or(self.broker.max_queue_size),
        })
    }

    /// Checks every limit and retry policy.
    ///
    /// # Errors
    ///
    /// Returns the first invalid entry, prefixed with its resource name.
    pub fn validate(&self) -> SluiceResult<()> {
        self.retry.validate()?;
        if self.broker.max_queue_size == 0 {
            return Err(ConfigError::new("broker.max_queue_size must be greater than zero").into());
        }
        for name in self.resources.keys() {
            let Some(profile) = self.resource(name) else {
                continue;
            };
            let scoped = |e: ConfigError| ConfigError::new(format!("resources.{}: {}", name, e.message));
            profile.rate_limits.validate().map_err(scoped)?;
            profile.retry.validate().map_err(scoped)?;
            if profile.max_concurrent == 0 {
                return Err(scoped(ConfigError::new("max_concurrent must be greater than zero")).into());
            }
            if profile.max_queue_size == 0 {
                return Err(scoped(ConfigError::new("max_queue_size must be greater than zero")).into());
            }
        }
        Ok(())
    }
}
