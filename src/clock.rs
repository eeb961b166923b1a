//! Wall-clock abstraction used to place requests into windows.

use crate::error::{LimiterError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time as a duration since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<Duration>;
}

/// Reads the system clock on every call.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Duration> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| LimiterError::Clock(e.to_string()))
    }
}

/// Nanoseconds in `d`, pinned at `u64::MAX` (about 584 years past the epoch).
fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(saturating_nanos(start))),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = saturating_nanos(by);
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(by)));
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(saturating_nanos(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration> {
        Ok(Duration::from_nanos(self.nanos.load(Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_epoch() {
        let now = SystemClock.now().unwrap();
        assert!(now.as_secs() > 1_600_000_000);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(Duration::from_secs(100));
        let other = clock.clone();

        clock.advance(Duration::from_millis(1500));
        assert_eq!(other.now().unwrap(), Duration::from_millis(101_500));

        other.set(Duration::from_secs(7));
        assert_eq!(clock.now().unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_manual_clock_saturates_instead_of_wrapping() {
        let clock = ManualClock::new(Duration::MAX);
        assert_eq!(clock.now().unwrap(), Duration::from_nanos(u64::MAX));

        clock.set(Duration::from_secs(100));
        clock.advance(Duration::MAX);
        assert_eq!(clock.now().unwrap(), Duration::from_nanos(u64::MAX));

        clock.set(Duration::from_nanos(u64::MAX - 1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now().unwrap(), Duration::from_nanos(u64::MAX));
    }
}
