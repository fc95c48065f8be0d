use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

use crate::error::BlockReason;

lazy_static! {
    pub static ref REQUESTS_EVALUATED: Counter =
        register_counter!("gate_requests_total", "Total number of requests evaluated by the gate").unwrap();
    pub static ref REQUESTS_ALLOWED: Counter =
        register_counter!("gate_requests_allowed_total", "Requests that passed the gate").unwrap();
    pub static ref REQUESTS_BLOCKED: CounterVec = register_counter_vec!(
        "gate_requests_blocked_total",
        "Requests blocked by the gate, by rule",
        &["reason"]
    )
    .unwrap();
    pub static ref CHALLENGES_ISSUED: Counter =
        register_counter!("gate_challenges_issued_total", "Challenges handed out").unwrap();
    pub static ref CHALLENGE_VERIFICATIONS: CounterVec = register_counter_vec!(
        "gate_challenge_verifications_total",
        "Challenge verification attempts, by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gate_upstream_latency_seconds",
        "Latency of forwarded requests in seconds"
    )
    .unwrap();
    pub static ref TRACKED_RECORDS: Gauge =
        register_gauge!("gate_tracked_records", "Records held in memory after the last sweep").unwrap();
}

pub fn record_block(reason: BlockReason) {
    REQUESTS_BLOCKED.with_label_values(&[reason.as_str()]).inc();
}

pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_counter_is_labelled_by_reason() {
        let before = REQUESTS_BLOCKED.with_label_values(&["flood"]).get();
        record_block(BlockReason::Flood);
        assert_eq!(REQUESTS_BLOCKED.with_label_values(&["flood"]).get(), before + 1.0);
    }

    #[test]
    fn render_includes_registered_metrics() {
        REQUESTS_EVALUATED.inc();
        let text = render().unwrap();
        assert!(text.contains("gate_requests_total"));
    }
}
