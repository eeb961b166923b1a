use crate::algorithms::Weighting;
use crate::error::LimiterError;
use crate::rate_limit_config::LimiterSettings;
use envconfig::Envconfig;
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Envconfig, Validate, Clone)]
pub struct Config {
    /// Redis connection URL
    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379")]
    #[validate(custom(function = "validate_redis_url"))]
    pub redis_url: String,

    /// Window length in seconds
    #[envconfig(from = "WINDOW_SIZE_SECS", default = "10")]
    #[validate(range(min = 1))]
    pub window_size_secs: u64,

    /// Highest interpolated rate admitted per window
    #[envconfig(from = "MAX_REQUESTS", default = "5")]
    #[validate(range(min = 1))]
    pub max_requests: u64,

    /// Namespace for counter keys
    #[envconfig(from = "KEY_PREFIX", default = "")]
    pub key_prefix: String,

    /// `sliding` or `literal`
    #[envconfig(from = "WEIGHTING", default = "sliding")]
    pub weighting: Weighting,

    #[envconfig(from = "ROLLOVER_SEED", default = "false")]
    pub rollover_seed: bool,

    /// Deadline for one admission check in milliseconds, 0 for none
    #[envconfig(from = "OPERATION_TIMEOUT_MS", default = "0")]
    pub operation_timeout_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, LimiterError> {
        let config = Config::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Limiter settings described by this configuration
    pub fn limiter_settings(&self) -> LimiterSettings {
        let settings = LimiterSettings::new(self.window_size_secs, self.max_requests)
            .with_weighting(self.weighting)
            .with_key_prefix(self.key_prefix.clone())
            .with_rollover_seed(self.rollover_seed);

        match self.operation_timeout_ms {
            0 => settings,
            ms => settings.with_timeout(Duration::from_millis(ms)),
        }
    }
}

/// Validates a Redis URL
fn validate_redis_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() {
        return Err(ValidationError::new("redis_url_empty"));
    }

    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(ValidationError::new("redis_url_scheme"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.window_size_secs, 10);
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.weighting, Weighting::Sliding);
        assert!(config.validate().is_ok());

        let settings = config.limiter_settings();
        assert_eq!(settings, LimiterSettings::new(10, 5));
    }

    #[test]
    fn test_overrides() {
        let config = Config::init_from_hashmap(&env(&[
            ("WINDOW_SIZE_SECS", "60"),
            ("MAX_REQUESTS", "100"),
            ("WEIGHTING", "literal"),
            ("KEY_PREFIX", "api"),
            ("ROLLOVER_SEED", "true"),
            ("OPERATION_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        let settings = config.limiter_settings();
        assert_eq!(settings.window_secs(), 60);
        assert_eq!(settings.max_requests, 100);
        assert_eq!(settings.weighting, Weighting::Literal);
        assert_eq!(settings.key_prefix, "api");
        assert!(settings.rollover_seed);
        assert_eq!(settings.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_unknown_weighting_rejected() {
        assert!(Config::init_from_hashmap(&env(&[("WEIGHTING", "linear")])).is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let config = Config::init_from_hashmap(&env(&[("MAX_REQUESTS", "0")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::init_from_hashmap(&env(&[("REDIS_URL", "http://localhost:6379")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_redis_url() {
        assert!(validate_redis_url("redis://localhost:6379").is_ok());
        assert!(validate_redis_url("rediss://localhost:6379").is_ok());
        assert!(validate_redis_url("").is_err());
    }
}
