use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::TimeDelta;
use clap::Parser;

use crate::error::ConfigError;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "manga-gate")]
#[command(about = "Abuse-mitigation gate in front of the manga site")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "GATE_PORT", default_value_t = 8080)]
    pub port: u16,

    // Site the allowed requests are forwarded to
    #[arg(short, long, env = "GATE_UPSTREAM", default_value = "http://localhost:3000")]
    pub upstream: String,

    // Max requests per IP per window
    #[arg(long, env = "GATE_IP_RATE_LIMIT", default_value_t = 20)]
    pub ip_rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, env = "GATE_WINDOW_MS", default_value_t = 60_000)]
    pub window_ms: u64,

    // Per route-prefix limits, PREFIX=LIMIT, first match wins (order matters)
    #[arg(
        long = "path-limit",
        env = "GATE_PATH_LIMITS",
        value_delimiter = ',',
        default_values_t = default_path_limits()
    )]
    pub path_limits: Vec<PathLimit>,

    // Heuristic rejections before an IP gets blocked
    #[arg(long, env = "GATE_CONSECUTIVE_ERRORS", default_value_t = 5)]
    pub consecutive_errors: u32,

    // Rate rejections before an IP gets blocked
    #[arg(long, env = "GATE_RAPID_REQUESTS", default_value_t = 10)]
    pub rapid_requests: u32,

    // Max hits on the same path inside the flood window
    #[arg(long, env = "GATE_FLOOD_THRESHOLD", default_value_t = 5)]
    pub flood_threshold: u32,

    #[arg(long, env = "GATE_FLOOD_WINDOW_MS", default_value_t = 1_000)]
    pub flood_window_ms: u64,

    #[arg(long, env = "GATE_BLOCK_DURATION_MS", default_value_t = 600_000)]
    pub block_duration_ms: u64,

    // IPs that bypass every check
    #[arg(long, env = "GATE_WHITELIST", value_delimiter = ',', default_values_t = vec!["127.0.0.1".to_string()])]
    pub whitelist: Vec<String>,

    // IPs that are always refused
    #[arg(long, env = "GATE_BLACKLIST", value_delimiter = ',')]
    pub blacklist: Vec<String>,

    // Peers allowed to report the client address via X-Forwarded-For / X-Real-IP
    #[arg(long = "trusted-proxy", env = "GATE_TRUSTED_PROXIES", value_delimiter = ',')]
    pub trusted_proxies: Vec<IpAddr>,

    // How often stale records are reclaimed
    #[arg(long, env = "GATE_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "GATE_CHALLENGE_TTL_SECS", default_value_t = 300)]
    pub challenge_ttl_secs: u64,
}

/// One `(prefix, limit)` rule of the route throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLimit {
    pub prefix: String,
    pub limit: u32,
}

impl PathLimit {
    pub fn new(prefix: impl Into<String>, limit: u32) -> Self {
        Self {
            prefix: prefix.into(),
            limit,
        }
    }
}

impl FromStr for PathLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, limit) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::PathLimit(s.to_string()))?;
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigError::PathLimit(s.to_string()));
        }
        let limit = limit
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::PathLimit(s.to_string()))?;
        Ok(Self::new(prefix, limit))
    }
}

impl std::fmt::Display for PathLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.prefix, self.limit)
    }
}

fn default_path_limits() -> Vec<PathLimit> {
    vec![
        PathLimit::new("/api/", 50),
        PathLimit::new("/api/manga", 30),
        PathLimit::new("/api/chapters", 30),
        PathLimit::new("/api/users", 20),
        PathLimit::new("/api/comments", 15),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspicionThresholds {
    pub consecutive_errors: u32,
    pub rapid_requests: u32,
}

/// Process-wide gate configuration, loaded once at start-up.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub ip_rate_limit: u32,
    pub path_rate_limit: Vec<PathLimit>,
    pub window: TimeDelta,
    pub suspicious_thresholds: SuspicionThresholds,
    pub flood_threshold: u32,
    pub flood_window: TimeDelta,
    pub block_duration: TimeDelta,
    pub whitelist: HashSet<String>,
    pub blacklist: HashSet<String>,
    pub trusted_proxies: HashSet<IpAddr>,
    pub challenge_ttl: TimeDelta,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ip_rate_limit: 20,
            path_rate_limit: default_path_limits(),
            window: TimeDelta::milliseconds(60_000),
            suspicious_thresholds: SuspicionThresholds {
                consecutive_errors: 5,
                rapid_requests: 10,
            },
            flood_threshold: 5,
            flood_window: TimeDelta::milliseconds(1_000),
            block_duration: TimeDelta::milliseconds(600_000),
            whitelist: HashSet::from(["127.0.0.1".to_string()]),
            blacklist: HashSet::new(),
            trusted_proxies: HashSet::new(),
            challenge_ttl: TimeDelta::minutes(5),
        }
    }
}

fn millis(ms: u64) -> TimeDelta {
    TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

impl From<&Args> for GateConfig {
    fn from(args: &Args) -> Self {
        Self {
            ip_rate_limit: args.ip_rate_limit,
            path_rate_limit: args.path_limits.clone(),
            window: millis(args.window_ms),
            suspicious_thresholds: SuspicionThresholds {
                consecutive_errors: args.consecutive_errors,
                rapid_requests: args.rapid_requests,
            },
            flood_threshold: args.flood_threshold,
            flood_window: millis(args.flood_window_ms),
            block_duration: millis(args.block_duration_ms),
            whitelist: args.whitelist.iter().map(|ip| ip.trim().to_string()).collect(),
            blacklist: args.blacklist.iter().map(|ip| ip.trim().to_string()).collect(),
            trusted_proxies: args.trusted_proxies.iter().copied().collect(),
            challenge_ttl: millis(args.challenge_ttl_secs.saturating_mul(1_000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gate_config_defaults() {
        let args = Args::parse_from(["manga-gate"]);
        let config = GateConfig::from(&args);
        let defaults = GateConfig::default();

        assert_eq!(config.ip_rate_limit, defaults.ip_rate_limit);
        assert_eq!(config.path_rate_limit, defaults.path_rate_limit);
        assert_eq!(config.window, defaults.window);
        assert_eq!(config.suspicious_thresholds, defaults.suspicious_thresholds);
        assert_eq!(config.flood_window, defaults.flood_window);
        assert_eq!(config.block_duration, defaults.block_duration);
        assert_eq!(config.whitelist, defaults.whitelist);
        assert!(config.blacklist.is_empty());
        assert!(config.trusted_proxies.is_empty());
        assert_eq!(config.challenge_ttl, defaults.challenge_ttl);
    }

    #[test]
    fn path_limits_keep_declaration_order() {
        let args = Args::parse_from([
            "manga-gate",
            "--path-limit",
            "/api/comments=3",
            "--path-limit",
            "/api/=9",
        ]);
        assert_eq!(
            args.path_limits,
            vec![PathLimit::new("/api/comments", 3), PathLimit::new("/api/", 9)]
        );
    }

    #[test]
    fn lists_accept_comma_delimited_values() {
        let args = Args::parse_from(["manga-gate", "--blacklist", "10.0.0.1,10.0.0.2"]);
        let config = GateConfig::from(&args);
        assert!(config.blacklist.contains("10.0.0.1"));
        assert!(config.blacklist.contains("10.0.0.2"));
    }

    #[test]
    fn trusted_proxies_must_be_addresses() {
        let args = Args::parse_from(["manga-gate", "--trusted-proxy", "10.0.0.1,::1"]);
        let config = GateConfig::from(&args);
        assert!(config.trusted_proxies.contains(&"10.0.0.1".parse::<IpAddr>().unwrap()));
        assert!(config.trusted_proxies.contains(&"::1".parse::<IpAddr>().unwrap()));
        assert!(Args::try_parse_from(["manga-gate", "--trusted-proxy", "not-an-ip"]).is_err());
    }

    #[test]
    fn malformed_path_limit_is_rejected() {
        assert!("/api".parse::<PathLimit>().is_err());
        assert!("=5".parse::<PathLimit>().is_err());
        assert!("/api=lots".parse::<PathLimit>().is_err());
        assert!(Args::try_parse_from(["manga-gate", "--path-limit", "/api"]).is_err());
    }
}
