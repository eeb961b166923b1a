//! Counter store contract shared by every limiter instance.
//!
//! The store is the single source of truth for window counters. Anything that
//! can run a small batch of counter operations atomically, read several keys at
//! once and overwrite a key with a TTL can back the limiter.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryStore;

/// A single operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Add one to the counter, creating it at zero first if missing.
    Increment { key: String },
    /// Set the time-to-live of an existing key.
    Expire { key: String, ttl: Duration },
    /// Write `value` with `ttl` only if the key does not exist.
    SetIfNotExists { key: String, value: i64, ttl: Duration },
}

/// Result of one [`BatchOp`], in the same position as its op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchReply {
    /// Post-increment counter value.
    Count(i64),
    /// Whether an `Expire` or `SetIfNotExists` took effect.
    Applied(bool),
}

impl BatchReply {
    pub fn as_count(&self) -> Option<i64> {
        match self {
            BatchReply::Count(value) => Some(*value),
            BatchReply::Applied(_) => None,
        }
    }

    pub fn applied(&self) -> Option<bool> {
        match self {
            BatchReply::Applied(applied) => Some(*applied),
            BatchReply::Count(_) => None,
        }
    }
}

/// Minimal store operations the limiter depends on.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Execute `ops` in order as one all-or-nothing unit.
    ///
    /// Returns one reply per op. On error none of the ops may be visible.
    async fn atomic_batch(&self, ops: &[BatchOp]) -> Result<Vec<BatchReply>>;

    /// Read several keys. Missing keys come back as `None`, never as `"0"`.
    ///
    /// Must observe the effects of earlier batches issued by the same caller.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Unconditionally overwrite `key` with `value` and `ttl`.
    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()>;
}
