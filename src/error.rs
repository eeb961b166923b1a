use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the limiter and its stores.
///
/// Store failures are passed through to the caller; no admission decision is
/// inferred from them.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Redis client error (connection, protocol, timeout inside the client)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failure reported by a non-Redis store, or a malformed store reply
    #[error("Store error: {0}")]
    Store(String),

    /// The whole `allow` operation ran past its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// System clock reads earlier than the Unix epoch
    #[error("Clock error: {0}")]
    Clock(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LimiterError {
    /// True when the error came from talking to the store.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            LimiterError::Redis(_) | LimiterError::Store(_) | LimiterError::Timeout(_)
        )
    }
}

impl From<envconfig::Error> for LimiterError {
    fn from(err: envconfig::Error) -> Self {
        LimiterError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for LimiterError {
    fn from(err: validator::ValidationErrors) -> Self {
        LimiterError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LimiterError>;
