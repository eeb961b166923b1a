//! In-process counter store.
//!
//! Implements the same contract as the Redis store for a single process, with
//! key expiry measured against an injected [`Clock`]. Useful for tests and for
//! running the demo without a Redis server.

use super::{BatchOp, BatchReply, CounterStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{LimiterError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Duration>,
}

impl Entry {
    fn is_live(&self, now: Duration) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| LimiterError::Internal("Failed to acquire store lock".into()))
    }

    /// Remaining time-to-live of a live key, `None` if missing or persistent.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now()?;
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_sub(now)))
    }

    /// Raw value of a live key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now()?;
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    /// Store an arbitrary string without expiry.
    pub fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let now = self.clock.now()?;
        let entries = self.lock()?;
        Ok(entries.values().filter(|entry| entry.is_live(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops every entry whose deadline has passed.
fn purge_expired(entries: &mut HashMap<String, Entry>, now: Duration) {
    entries.retain(|_, entry| entry.is_live(now));
}

/// Looks a key up in the staged batch writes first, then in the committed map.
fn staged_lookup(
    staged: &HashMap<String, Entry>,
    entries: &HashMap<String, Entry>,
    key: &str,
    now: Duration,
) -> Option<Entry> {
    staged
        .get(key)
        .or_else(|| entries.get(key).filter(|e| e.is_live(now)))
        .cloned()
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn atomic_batch(&self, ops: &[BatchOp]) -> Result<Vec<BatchReply>> {
        let now = self.clock.now()?;
        let mut entries = self.lock()?;

        // Writes are staged so a failing op leaves the map untouched.
        let mut staged: HashMap<String, Entry> = HashMap::new();
        let mut replies = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                BatchOp::Increment { key } => {
                    let current = staged_lookup(&staged, &entries, key, now);
                    let (count, expires_at) = match current {
                        Some(entry) => {
                            let count: i64 = entry.value.parse().map_err(|_| {
                                LimiterError::Store(format!(
                                    "Value at '{}' is not an integer",
                                    key
                                ))
                            })?;
                            (count, entry.expires_at)
                        }
                        None => (0, None),
                    };
                    let next = count.checked_add(1).ok_or_else(|| {
                        LimiterError::Store(format!("Increment would overflow at '{}'", key))
                    })?;
                    staged.insert(
                        key.clone(),
                        Entry {
                            value: next.to_string(),
                            expires_at,
                        },
                    );
                    replies.push(BatchReply::Count(next));
                }
                BatchOp::Expire { key, ttl } => match staged_lookup(&staged, &entries, key, now) {
                    Some(mut entry) => {
                        entry.expires_at = Some(now + *ttl);
                        staged.insert(key.clone(), entry);
                        replies.push(BatchReply::Applied(true));
                    }
                    None => replies.push(BatchReply::Applied(false)),
                },
                BatchOp::SetIfNotExists { key, value, ttl } => {
                    if staged_lookup(&staged, &entries, key, now).is_some() {
                        replies.push(BatchReply::Applied(false));
                    } else {
                        staged.insert(
                            key.clone(),
                            Entry {
                                value: value.to_string(),
                                expires_at: Some(now + *ttl),
                            },
                        );
                        replies.push(BatchReply::Applied(true));
                    }
                }
            }
        }

        purge_expired(&mut entries, now);
        entries.extend(staged);

        Ok(replies)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = self.clock.now()?;
        let entries = self.lock()?;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| entry.is_live(now))
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let now = self.clock.now()?;
        let mut entries = self.lock()?;
        purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }
}
