//! Sliding window counter rate limiting
//!
//! Every identity gets one counter per fixed window, kept in a shared store.
//! A request increments the counter of the window it falls in, and the rate
//! it is judged against blends that count with the previous window's count,
//! so the limit behaves like a window sliding along with the clock.
//!
//! The current count is the value returned by the increment itself. The
//! previous count is read back after the batch, since the batch only creates
//! that slot and never reports its value.
//!
//! The limiter holds no mutable state of its own. Any number of instances,
//! in any number of processes, agree on decisions as long as they share the
//! store and the settings.

use super::{Decision, RateLimitAlgorithm};
use crate::clock::{Clock, SystemClock};
use crate::error::{LimiterError, Result};
use crate::key_generator::KeyGenerator;
use crate::rate_limit_config::LimiterSettings;
use crate::store::{BatchOp, BatchReply, CounterStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Distributed sliding window rate limiter
pub struct WindowLimiter<S> {
    store: S,
    settings: LimiterSettings,
    keys: KeyGenerator,
    clock: Arc<dyn Clock>,
}

/// Start of the window containing `now_secs`.
pub fn window_start(now_secs: i64, window_size: i64) -> i64 {
    now_secs.div_euclid(window_size) * window_size
}

/// Counter value as written by the limiter; anything else counts as zero.
fn parse_count(raw: Option<&str>, key: &str) -> i64 {
    match raw {
        None => 0,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(
                target: "window_limiter::sliding_window",
                key = %key,
                value = %value,
                "Unparseable counter value, treating as 0"
            );
            0
        }),
    }
}

impl<S: CounterStore> WindowLimiter<S> {
    /// Create a limiter admitting up to `max_requests` per `window_size_secs`.
    pub fn new(store: S, window_size_secs: u64, max_requests: u64) -> Result<Self> {
        Self::with_settings(store, LimiterSettings::new(window_size_secs, max_requests))
    }

    pub fn with_settings(store: S, settings: LimiterSettings) -> Result<Self> {
        settings.validate()?;
        let keys = KeyGenerator::with_prefix(&settings.key_prefix)?;

        Ok(Self {
            store,
            settings,
            keys,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the wall clock used to place requests into windows.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Count one request for `identity` and report whether it is admitted.
    ///
    /// Store failures are returned as errors; no decision is made for them.
    pub async fn allow(&self, identity: &str) -> Result<bool> {
        Ok(self.check(identity).await?.admitted)
    }

    /// Like [`allow`](Self::allow) but returns every figure behind the decision.
    pub async fn check(&self, identity: &str) -> Result<Decision> {
        KeyGenerator::validate_identity(identity)?;

        match self.settings.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.evaluate(identity))
                .await
                .map_err(|_| {
                    error!(
                        target: "window_limiter::sliding_window",
                        identity = %identity,
                        timeout = ?deadline,
                        "Admission check timed out"
                    );
                    LimiterError::Timeout(deadline)
                })?,
            None => self.evaluate(identity).await,
        }
    }

    async fn evaluate(&self, identity: &str) -> Result<Decision> {
        let now = self.clock.now()?;
        let size = self.settings.window_secs() as i64;
        let current_start = window_start(now.as_secs() as i64, size);
        let previous_start = current_start - size;

        let key_current = self.keys.window_key(identity, current_start);
        let key_previous = self.keys.window_key(identity, previous_start);
        let ttl = self.settings.counter_ttl();

        let ops = [
            BatchOp::Increment {
                key: key_current.clone(),
            },
            BatchOp::Expire {
                key: key_current.clone(),
                ttl,
            },
            BatchOp::SetIfNotExists {
                key: key_previous.clone(),
                value: 0,
                ttl,
            },
        ];

        let replies = self.store.atomic_batch(&ops).await.map_err(|e| {
            error!(
                target: "window_limiter::sliding_window",
                identity = %identity,
                error = %e,
                "Counter update failed"
            );
            e
        })?;

        let incremented = replies
            .first()
            .and_then(BatchReply::as_count)
            .ok_or_else(|| LimiterError::Store("Batch reply is missing the increment".into()))?;
        let previous_created = replies
            .get(2)
            .and_then(BatchReply::applied)
            .ok_or_else(|| LimiterError::Store("Batch reply is missing the previous slot".into()))?;

        let values = self
            .store
            .multi_get(&[key_current.clone(), key_previous.clone()])
            .await
            .map_err(|e| {
                error!(
                    target: "window_limiter::sliding_window",
                    identity = %identity,
                    error = %e,
                    "Counter read failed"
                );
                e
            })?;

        // The increment reply is this request's position in the window. The read-back
        // of the current key may already include later callers and is not used.
        let current_count = incremented;
        let previous_count = parse_count(values.get(1).and_then(|v| v.as_deref()), &key_previous);

        let weights = self
            .settings
            .weighting
            .weights(now, current_start, self.settings.window_secs());
        let rate = weights.previous * previous_count as f64 + weights.current * current_count as f64;

        // The previous slot did not exist before this call: nothing landed in the
        // preceding window, so seed it from the current count.
        let rolled_over = self.settings.rollover_seed && previous_created;
        if rolled_over {
            if let Err(e) = self.store.set(&key_previous, current_count, ttl).await {
                warn!(
                    target: "window_limiter::sliding_window",
                    identity = %identity,
                    key = %key_previous,
                    error = %e,
                    "Failed to reseed previous window"
                );
            }
        }

        let admitted = rate <= self.settings.max_requests as f64;

        debug!(
            target: "window_limiter::sliding_window",
            identity = %identity,
            window = current_start,
            current_count,
            previous_count,
            rate,
            admitted,
            rolled_over,
            "Admission decision"
        );

        Ok(Decision {
            identity: identity.to_string(),
            admitted,
            rate,
            window_start: current_start,
            current_count,
            previous_count,
            previous_weight: weights.previous,
            current_weight: weights.current,
            rolled_over,
        })
    }
}

#[async_trait]
impl<S: CounterStore> RateLimitAlgorithm for WindowLimiter<S> {
    async fn decide(&self, identity: &str) -> Result<Decision> {
        self.check(identity).await
    }
}
