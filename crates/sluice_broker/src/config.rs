//! Per-resource registration.

use sluice_core::{RateLimitConfig, RetryConfig};
use sluice_error::{BuilderError, BuilderErrorKind, ConfigError};
use sluice_interface::ResourceExecutor;
use sluice_rate_limit::ResourceProfile;
use std::sync::Arc;

/// Everything the broker needs to serve one resource.
///
/// # Example
///
/// ```rust,ignore
/// use sluice_broker::ResourceConfig;
/// use sluice_core::RateLimitConfig;
///
/// let config = ResourceConfig::builder()
///     .rate_limits(RateLimitConfig::new(60, 60_000))
///     .executor(executor)
///     .max_concurrent(2u32)
///     .build()?;
/// ```
#[derive(Clone, derive_builder::Builder, derive_getters::Getters)]
#[builder(setter(into), build_fn(private, name = "build_internal"))]
pub struct ResourceConfig {
    /// Admission limits
    rate_limits: RateLimitConfig,
    /// Performs the actual provider call
    executor: Arc<dyn ResourceExecutor>,
    /// Retry policy
    #[builder(default)]
    retry: RetryConfig,
    /// Executions in flight at once
    #[builder(default = "1")]
    max_concurrent: u32,
    /// Queue capacity; the broker-wide default applies when unset
    #[builder(default, setter(into, strip_option))]
    max_queue_size: Option<usize>,
}

impl std::fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("rate_limits", &self.rate_limits)
            .field("retry", &self.retry)
            .field("max_concurrent", &self.max_concurrent)
            .field("max_queue_size", &self.max_queue_size)
            .finish_non_exhaustive()
    }
}

impl ResourceConfig {
    /// Starts a builder.
    pub fn builder() -> ResourceConfigBuilder {
        ResourceConfigBuilder::default()
    }

    /// Registration from a loaded configuration profile.
    pub fn from_profile(profile: &ResourceProfile, executor: Arc<dyn ResourceExecutor>) -> Self {
        Self {
            rate_limits: *profile.rate_limits(),
            executor,
            retry: *profile.retry(),
            max_concurrent: *profile.max_concurrent(),
            max_queue_size: Some(*profile.max_queue_size()),
        }
    }

    /// Checks limits, retry policy and capacities.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limits.validate()?;
        self.retry.validate()?;
        if self.max_concurrent == 0 {
            return Err(ConfigError::new("max_concurrent must be greater than zero"));
        }
        if self.max_queue_size == Some(0) {
            return Err(ConfigError::new("max_queue_size must be greater than zero"));
        }
        Ok(())
    }

    /// Same executor instance and equal settings.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.executor), Arc::as_ptr(&other.executor))
            && self.rate_limits == other.rate_limits
            && self.retry == other.retry
            && self.max_concurrent == other.max_concurrent
            && self.max_queue_size == other.max_queue_size
    }
}

impl ResourceConfigBuilder {
    /// Builds and validates the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the limits or executor are missing, or a setting
    /// is invalid.
    pub fn build(&self) -> Result<ResourceConfig, BuilderError> {
        let config = self.build_internal().map_err(|e| match e {
            ResourceConfigBuilderError::UninitializedField(field) => {
                BuilderError::new(BuilderErrorKind::MissingField(field.to_string()))
            }
            ResourceConfigBuilderError::ValidationError(msg) => {
                BuilderError::new(BuilderErrorKind::ValidationFailed(msg))
            }
        })?;
        config
            .validate()
            .map_err(|e| BuilderError::new(BuilderErrorKind::ValidationFailed(e.message)))?;
        Ok(config)
    }
}
