use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::metrics::TRACKED_RECORDS;
use crate::state::AppState;

// Reclaims records whose state already reads as absent. Lazy expiry on access
// stays authoritative; this only bounds memory between accesses.
pub async fn sweeper(state: Arc<AppState>, every: Duration) {
    let mut interval = interval(every);

    info!(interval = ?every, "record sweeper started");

    loop {
        interval.tick().await;
        let tracked = sweep_once(&state);
        debug!(tracked, "sweep finished");
    }
}

pub fn sweep_once(state: &AppState) -> usize {
    let now = Utc::now();
    let tracked = state.gate.sweep(now);
    state.challenges.sweep(now);
    let total = tracked + state.challenges.outstanding();
    TRACKED_RECORDS.set(total as f64);
    total
}
