//! Rate limiting algorithms module
//!
//! Holds the sliding window counter limiter and the pieces it shares with
//! callers: the weighting modes used to blend two adjacent windows and the
//! decision value each check produces.

pub mod sliding_window;

use crate::error::{LimiterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use sliding_window::WindowLimiter;

/// How the previous and current window counts are blended into one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// `rate = previous * (1 - elapsed) + current`, where `elapsed` is the
    /// fraction of the current window that has passed.
    #[default]
    Sliding,
    /// `previous_weight = (window_start - now) / window_size` and
    /// `current_weight = 1 - previous_weight`, on whole seconds.
    ///
    /// The previous window is subtracted rather than decayed. Kept for
    /// deployments that must match decisions made by older limiters.
    Literal,
}

/// Interpolation weights applied to the two window counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowWeights {
    pub previous: f64,
    pub current: f64,
}

impl Weighting {
    /// Weights for a request at `now` inside the window starting at `window_start`.
    pub fn weights(&self, now: Duration, window_start: i64, window_size: u64) -> WindowWeights {
        let size = window_size as f64;
        match self {
            Weighting::Sliding => {
                let elapsed = (now.as_secs_f64() - window_start as f64) / size;
                WindowWeights {
                    previous: 1.0 - elapsed,
                    current: 1.0,
                }
            }
            Weighting::Literal => {
                let previous = (window_start - now.as_secs() as i64) as f64 / size;
                WindowWeights {
                    previous,
                    current: 1.0 - previous,
                }
            }
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weighting::Sliding => write!(f, "sliding"),
            Weighting::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for Weighting {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sliding" => Ok(Weighting::Sliding),
            "literal" => Ok(Weighting::Literal),
            other => Err(LimiterError::Configuration(format!(
                "Unknown weighting '{}'. Must be one of: sliding, literal",
                other
            ))),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub identity: String,
    pub admitted: bool,
    pub rate: f64,
    pub window_start: i64,
    pub current_count: i64,
    pub previous_count: i64,
    pub previous_weight: f64,
    pub current_weight: f64,
    /// The previous-window slot was reseeded from the current count.
    pub rolled_over: bool,
}

/// Trait for rate limiting algorithms
#[async_trait]
pub trait RateLimitAlgorithm: Send + Sync {
    /// Count one request for `identity` and decide whether to admit it.
    async fn decide(&self, identity: &str) -> Result<Decision>;

    /// Check if a request should be allowed
    async fn is_allowed(&self, identity: &str) -> Result<bool> {
        Ok(self.decide(identity).await?.admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_sliding_weights_decay_previous() {
        let w = Weighting::Sliding.weights(Duration::from_secs(1004), 1000, 10);
        assert!((w.previous - 0.6).abs() < EPSILON);
        assert_eq!(w.current, 1.0);

        let start = Weighting::Sliding.weights(Duration::from_secs(1000), 1000, 10);
        assert!((start.previous - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_sliding_weights_use_subsecond_time() {
        let w = Weighting::Sliding.weights(Duration::from_millis(1_002_500), 1000, 10);
        assert!((w.previous - 0.75).abs() < EPSILON);
    }

    #[test]
    fn test_literal_weights_are_non_positive() {
        let w = Weighting::Literal.weights(Duration::from_millis(1_004_900), 1000, 10);
        // whole seconds only
        assert!((w.previous + 0.4).abs() < EPSILON);
        assert!((w.current - 1.4).abs() < EPSILON);

        let start = Weighting::Literal.weights(Duration::from_secs(1000), 1000, 10);
        assert_eq!(start.previous, 0.0);
        assert_eq!(start.current, 1.0);
    }

    #[test]
    fn test_weighting_parse() {
        assert_eq!("sliding".parse::<Weighting>().unwrap(), Weighting::Sliding);
        assert_eq!(" Literal ".parse::<Weighting>().unwrap(), Weighting::Literal);
        assert!("linear".parse::<Weighting>().is_err());
        assert_eq!(Weighting::Literal.to_string(), "literal");
    }

    #[test]
    fn test_weighting_serde() {
        let json = serde_json::to_string(&Weighting::Literal).unwrap();
        assert_eq!(json, "\"literal\"");
        let parsed: Weighting = serde_json::from_str("\"sliding\"").unwrap();
        assert_eq!(parsed, Weighting::Sliding);
    }
}
