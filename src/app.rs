use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::get,
};

use crate::handlers::{health_handler, issue_challenge, metrics_handler, proxy_handler, verify_challenge};
use crate::middleware::gate_middleware;
use crate::state::AppState;

// Gate's own endpoints stay reachable for blocked clients; everything else is
// gated and forwarded to the site.
pub fn build_router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/security/captcha", get(issue_challenge).post(verify_challenge))
        .merge(gated)
        .with_state(state)
}
