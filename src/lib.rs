//! Distributed sliding-window rate limiting.
//!
//! Admission decisions are computed from per-window counters kept in a shared
//! store, so every process that points at the same store enforces the same
//! quota for an identity.

pub mod algorithms;
pub mod clock;
pub mod config;
pub mod error;
pub mod key_generator;
pub mod rate_limit_config;
pub mod redis;
pub mod store;

pub use algorithms::{Decision, RateLimitAlgorithm, Weighting, WindowLimiter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{LimiterError, Result};
pub use rate_limit_config::LimiterSettings;
pub use crate::redis::RedisStore;
pub use store::{BatchOp, BatchReply, CounterStore, MemoryStore};
