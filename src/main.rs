use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod challenge;
mod config;
mod error;
mod gate;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod rate_limit;
mod session;
mod state;
mod store;
mod suspicion;
mod sweeper;
mod user_agent;

use crate::challenge::ChallengeService;
use crate::config::{Args, GateConfig};
use crate::gate::RequestGate;
use crate::session::UpstreamSessions;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();
    let config = GateConfig::from(&args);

    // redirects belong to the browser, not the proxy
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let state = Arc::new(AppState {
        client: client.clone(),
        upstream: args.upstream.clone(),
        challenges: ChallengeService::new(config.challenge_ttl),
        sessions: Arc::new(UpstreamSessions::new(client, &args.upstream)),
        gate: RequestGate::new(config),
    });

    // spawn the background sweeper
    let sweep_state = state.clone();
    let sweep_every = Duration::from_secs(args.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        sweeper::sweeper(sweep_state, sweep_every).await;
    });

    let app = app::build_router(state.clone());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let config = state.gate.config();
    info!(port = args.port, upstream = %args.upstream, "gate running");
    if config.trusted_proxies.is_empty() {
        info!("Client address: socket peer, forwarding headers ignored");
    } else {
        info!("Client address: forwarding headers trusted from {} proxies", config.trusted_proxies.len());
    }
    info!(
        "Rate limit: {} requests per {} ms, {} path rules",
        config.ip_rate_limit,
        config.window.num_milliseconds(),
        config.path_rate_limit.len()
    );
    info!(
        "Suspicion: block after {} bad agents or {} rate hits, for {} ms",
        config.suspicious_thresholds.consecutive_errors,
        config.suspicious_thresholds.rapid_requests,
        config.block_duration.num_milliseconds()
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
