use chrono::{DateTime, TimeDelta, Utc};

use crate::store::{MemoryStore, RecordStore};

// Rate limit entry - tracks requests per key inside one fixed window
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl RateLimitEntry {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn is_stale(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now - self.window_start >= window
    }
}

/// Fixed-window request counter keyed by an arbitrary string.
///
/// The limit is inclusive: the `limit`-th request inside a window is the last
/// one allowed. Denied requests do not bump the counter, so it stays pinned at
/// the limit until the window rolls over.
pub struct FixedWindowLimiter<S = MemoryStore<RateLimitEntry>> {
    store: S,
    window: TimeDelta,
}

impl FixedWindowLimiter {
    pub fn new(window: TimeDelta) -> Self {
        Self::with_store(MemoryStore::new(), window)
    }
}

impl<S: RecordStore<RateLimitEntry>> FixedWindowLimiter<S> {
    pub fn with_store(store: S, window: TimeDelta) -> Self {
        Self { store, window }
    }

    pub fn check_and_consume(&self, key: &str, limit: u32, now: DateTime<Utc>) -> bool {
        let window = self.window;
        self.store.upsert(
            key,
            || RateLimitEntry::fresh(now),
            |entry| {
                // new record or expired window? start over
                if entry.count == 0 || entry.is_stale(now, window) {
                    entry.count = 1;
                    entry.window_start = now;
                    return true;
                }

                if entry.count >= limit {
                    return false;
                }

                entry.count += 1;
                true
            },
        )
    }

    /// Current count for `key`, treating a stale window as absent.
    #[cfg(test)]
    pub fn current_count(&self, key: &str, now: DateTime<Utc>) -> u32 {
        let window = self.window;
        self.store
            .update(key, |entry| {
                if entry.is_stale(now, window) {
                    0
                } else {
                    entry.count
                }
            })
            .unwrap_or(0)
    }

    /// Drop every record whose window has already rolled over.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_stale(now, window));
        before.saturating_sub(self.store.len())
    }

    pub fn tracked(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn allows_up_to_limit_inclusive() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(60_000));
        for i in 0..20 {
            assert!(limiter.check_and_consume("1.2.3.4", 20, at(i)), "request {}", i + 1);
        }
        assert!(!limiter.check_and_consume("1.2.3.4", 20, at(59_999)));
    }

    #[test]
    fn denial_does_not_increment() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(1_000));
        assert!(limiter.check_and_consume("k", 2, at(0)));
        assert!(limiter.check_and_consume("k", 2, at(1)));
        for i in 2..50 {
            assert!(!limiter.check_and_consume("k", 2, at(i)));
        }
        assert_eq!(limiter.current_count("k", at(50)), 2);
    }

    #[test]
    fn window_rollover_resets_to_one() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(60_000));
        for i in 0..20 {
            limiter.check_and_consume("ip", 20, at(i));
        }
        assert!(!limiter.check_and_consume("ip", 20, at(30_000)));
        assert!(limiter.check_and_consume("ip", 20, at(60_000)));
        assert_eq!(limiter.current_count("ip", at(60_001)), 1);
    }

    #[test]
    fn zero_limit_still_admits_first_observation() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(1_000));
        assert!(limiter.check_and_consume("k", 0, at(0)));
        assert!(!limiter.check_and_consume("k", 0, at(1)));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(1_000));
        assert!(limiter.check_and_consume("a", 1, at(0)));
        assert!(!limiter.check_and_consume("a", 1, at(1)));
        assert!(limiter.check_and_consume("b", 1, at(1)));
    }

    #[test]
    fn sweep_removes_only_stale_windows() {
        let limiter = FixedWindowLimiter::new(TimeDelta::milliseconds(1_000));
        limiter.check_and_consume("old", 5, at(0));
        limiter.check_and_consume("new", 5, at(900));
        assert_eq!(limiter.sweep(at(1_000)), 1);
        assert_eq!(limiter.tracked(), 1);
        assert_eq!(limiter.current_count("new", at(1_000)), 1);
    }
}
