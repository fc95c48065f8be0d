//! Per-IP suspicion escalation.
//!
//! Negative signals accumulate on a record per IP. Once either counter reaches
//! its threshold the IP is blocked for a fixed duration. The block is lifted
//! lazily: the first `is_blocked` call after `block_until` clears it and zeroes
//! both counters.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use crate::config::SuspicionThresholds;
use crate::store::{MemoryStore, RecordStore};

/// Kind of negative signal observed for an IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Request rejected on identity grounds (bad user-agent).
    ConsecutiveError,
    /// Request rejected for volume (rate, path or flood limit).
    RapidRequest,
}

#[derive(Debug, Clone)]
pub struct SuspicionRecord {
    pub consecutive_errors: u32,
    pub last_error_time: Option<DateTime<Utc>>,
    pub rapid_requests: u32,
    pub last_request_time: Option<DateTime<Utc>>,
    pub blocked: bool,
    pub block_until: Option<DateTime<Utc>>,
}

impl SuspicionRecord {
    fn empty() -> Self {
        Self {
            consecutive_errors: 0,
            last_error_time: None,
            rapid_requests: 0,
            last_request_time: None,
            blocked: false,
            block_until: None,
        }
    }

    fn block_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.block_until.is_none_or(|until| now >= until)
    }

    fn clear(&mut self) {
        self.blocked = false;
        self.consecutive_errors = 0;
        self.rapid_requests = 0;
    }

    // observable state equals "no record at all"
    fn is_dormant(&self, now: DateTime<Utc>) -> bool {
        if self.blocked {
            return self.block_elapsed(now);
        }
        self.consecutive_errors == 0 && self.rapid_requests == 0
    }
}

pub struct SuspicionTracker<S = MemoryStore<SuspicionRecord>> {
    store: S,
    thresholds: SuspicionThresholds,
    block_duration: TimeDelta,
}

impl SuspicionTracker {
    pub fn new(thresholds: SuspicionThresholds, block_duration: TimeDelta) -> Self {
        Self::with_store(MemoryStore::new(), thresholds, block_duration)
    }
}

impl<S: RecordStore<SuspicionRecord>> SuspicionTracker<S> {
    pub fn with_store(store: S, thresholds: SuspicionThresholds, block_duration: TimeDelta) -> Self {
        Self {
            store,
            thresholds,
            block_duration,
        }
    }

    pub fn is_blocked(&self, ip: &str, now: DateTime<Utc>) -> bool {
        self.store
            .update(ip, |record| {
                if !record.blocked {
                    return false;
                }
                if !record.block_elapsed(now) {
                    return true;
                }
                record.clear();
                false
            })
            .unwrap_or(false)
    }

    /// Record a negative signal. Returns true if the IP is blocked afterwards.
    pub fn record_signal(&self, ip: &str, signal: Signal, now: DateTime<Utc>) -> bool {
        let thresholds = self.thresholds;
        let block_duration = self.block_duration;
        self.store.upsert(ip, SuspicionRecord::empty, |record| {
            match signal {
                Signal::ConsecutiveError => {
                    record.consecutive_errors += 1;
                    record.last_error_time = Some(now);
                }
                Signal::RapidRequest => {
                    record.rapid_requests += 1;
                    record.last_request_time = Some(now);
                }
            }

            if record.consecutive_errors >= thresholds.consecutive_errors
                || record.rapid_requests >= thresholds.rapid_requests
            {
                let until = now + block_duration;
                record.blocked = true;
                record.block_until = Some(until);
                warn!(ip = %ip, block_until = %until.to_rfc3339(), "IP {} blocked until {}", ip, until.to_rfc3339());
            }
            record.blocked
        })
    }

    #[cfg(test)]
    pub fn snapshot(&self, ip: &str) -> Option<SuspicionRecord> {
        self.store.update(ip, |record| record.clone())
    }

    /// Drop records that carry no state beyond what absence already means.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.store.len();
        self.store.retain(|_, record| !record.is_dormant(now));
        before.saturating_sub(self.store.len())
    }

    pub fn tracked(&self) -> usize {
        self.store.len()
    }
}
