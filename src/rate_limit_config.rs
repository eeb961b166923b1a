use crate::algorithms::Weighting;
use crate::error::LimiterError;
use crate::key_generator::KEY_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings a limiter is built with. Fixed once the limiter exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Length of one counting window. Whole seconds.
    #[serde(with = "humantime_serde")]
    pub window_size: Duration,
    /// Highest interpolated rate that is still admitted.
    pub max_requests: u64,
    #[serde(default)]
    pub weighting: Weighting,
    /// Namespace for counter keys; empty for none.
    #[serde(default)]
    pub key_prefix: String,
    /// Reseed the previous-window slot when an identity returns from idling.
    /// Off by default: decisions then match limiters that never reseed.
    #[serde(default)]
    pub rollover_seed: bool,
    /// Deadline for a whole admission check, store round-trips included.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::new(10, 5)
    }
}

impl LimiterSettings {
    /// Create settings for `max_requests` per `window_size_secs` seconds
    pub fn new(window_size_secs: u64, max_requests: u64) -> Self {
        Self {
            window_size: Duration::from_secs(window_size_secs),
            max_requests,
            weighting: Weighting::default(),
            key_prefix: String::new(),
            rollover_seed: false,
            timeout: None,
        }
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_rollover_seed(mut self, enabled: bool) -> Self {
        self.rollover_seed = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn window_secs(&self) -> u64 {
        self.window_size.as_secs()
    }

    /// Lifetime of a counter key: it must survive while it can still be read
    /// as the previous window of a later one.
    pub fn counter_ttl(&self) -> Duration {
        self.window_size * 2
    }

    /// Validate settings parameters
    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.window_size.as_secs() == 0 {
            return Err(LimiterError::Configuration(
                "Window size must be at least one second".to_string(),
            ));
        }
        if self.window_size.subsec_nanos() != 0 {
            return Err(LimiterError::Configuration(
                "Window size must be a whole number of seconds".to_string(),
            ));
        }
        if self.max_requests == 0 {
            return Err(LimiterError::Configuration(
                "Max requests must be greater than 0".to_string(),
            ));
        }
        if self.key_prefix.contains(KEY_SEPARATOR) {
            return Err(LimiterError::Configuration(format!(
                "Key prefix must not contain '{}'",
                KEY_SEPARATOR
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(LimiterError::Configuration(
                "Timeout must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}
