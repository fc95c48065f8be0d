//! Per-request allow/block decision.
//!
//! Rules run in a fixed order and the first decisive one wins:
//! whitelist, blacklist, active suspicion block, per-IP rate, per-route-prefix
//! rate, user-agent heuristics, then the sub-second flood check on the exact
//! path. Volume rejections feed the suspicion tracker as rapid requests, a bad
//! user-agent feeds it as a consecutive error.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::GateConfig;
use crate::error::{BlockReason, GateError};
use crate::rate_limit::{FixedWindowLimiter, RateLimitEntry};
use crate::store::{MemoryStore, RecordStore};
use crate::suspicion::{Signal, SuspicionRecord, SuspicionTracker};
use crate::user_agent::is_suspicious_user_agent;

/// Headers attached to every response that passes the gate's checks.
/// Whitelisted clients skip the checks and get the upstream response as is.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-xss-protection", "1; mode=block"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; img-src 'self' data: blob:; font-src 'self'; connect-src 'self'",
    ),
];

pub struct RequestGate<L = MemoryStore<RateLimitEntry>, T = MemoryStore<SuspicionRecord>> {
    config: GateConfig,
    ip_limiter: FixedWindowLimiter<L>,
    path_limiter: FixedWindowLimiter<L>,
    flood_limiter: FixedWindowLimiter<L>,
    suspicion: SuspicionTracker<T>,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        Self::with_stores(
            config,
            MemoryStore::new(),
            MemoryStore::new(),
            MemoryStore::new(),
            MemoryStore::new(),
        )
    }
}

impl<L, T> RequestGate<L, T>
where
    L: RecordStore<RateLimitEntry>,
    T: RecordStore<SuspicionRecord>,
{
    /// Build a gate over caller-supplied stores, one per counter scope.
    pub fn with_stores(config: GateConfig, ip_store: L, path_store: L, flood_store: L, suspicion_store: T) -> Self {
        Self {
            ip_limiter: FixedWindowLimiter::with_store(ip_store, config.window),
            path_limiter: FixedWindowLimiter::with_store(path_store, config.window),
            flood_limiter: FixedWindowLimiter::with_store(flood_store, config.flood_window),
            suspicion: SuspicionTracker::with_store(
                suspicion_store,
                config.suspicious_thresholds,
                config.block_duration,
            ),
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn is_whitelisted(&self, ip: &str) -> bool {
        self.config.whitelist.contains(ip)
    }

    pub fn evaluate(&self, ip: &str, path: &str, user_agent: &str, now: DateTime<Utc>) -> Result<(), GateError> {
        if self.is_whitelisted(ip) {
            return Ok(());
        }

        if self.config.blacklist.contains(ip) {
            return Err(GateError::Forbidden(BlockReason::Blacklist));
        }

        if self.suspicion.is_blocked(ip, now) {
            return Err(GateError::TooManyRequests(BlockReason::Suspicion));
        }

        if !self.ip_limiter.check_and_consume(ip, self.config.ip_rate_limit, now) {
            return Err(self.rapid(ip, BlockReason::IpRate, now));
        }

        // only the first matching prefix counts
        if let Some(rule) = self
            .config
            .path_rate_limit
            .iter()
            .find(|rule| path.starts_with(rule.prefix.as_str()))
        {
            let key = format!("{}|{}", ip, rule.prefix);
            if !self.path_limiter.check_and_consume(&key, rule.limit, now) {
                return Err(self.rapid(ip, BlockReason::PathRate, now));
            }
        }

        if is_suspicious_user_agent(user_agent) {
            self.suspicion.record_signal(ip, Signal::ConsecutiveError, now);
            debug!(ip = %ip, user_agent = %user_agent, "suspicious user-agent");
            return Err(GateError::Forbidden(BlockReason::UserAgent));
        }

        let key = format!("{}|{}", ip, path);
        if !self.flood_limiter.check_and_consume(&key, self.config.flood_threshold, now) {
            return Err(self.rapid(ip, BlockReason::Flood, now));
        }

        Ok(())
    }

    fn rapid(&self, ip: &str, reason: BlockReason, now: DateTime<Utc>) -> GateError {
        self.suspicion.record_signal(ip, Signal::RapidRequest, now);
        debug!(ip = %ip, reason = %reason, "rate limited");
        GateError::TooManyRequests(reason)
    }

    /// Reclaim stale records. Returns how many records remain tracked.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.ip_limiter.sweep(now);
        self.path_limiter.sweep(now);
        self.flood_limiter.sweep(now);
        self.suspicion.sweep(now);
        self.tracked()
    }

    pub fn tracked(&self) -> usize {
        self.ip_limiter.tracked()
            + self.path_limiter.tracked()
            + self.flood_limiter.tracked()
            + self.suspicion.tracked()
    }
}
