use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::debug;

use crate::gate::SECURITY_HEADERS;
use crate::metrics::{REQUESTS_ALLOWED, REQUESTS_EVALUATED, record_block};
use crate::session::{self, Access};
use crate::state::AppState;

/// Address the gate keys its counters on.
///
/// The socket peer is authoritative. Only a peer listed in `trusted_proxies`
/// may speak for the client through `x-forwarded-for` (walked from the nearest
/// hop, skipping our own proxies) or `x-real-ip`. Header values that are not
/// IP addresses are ignored.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxies: &HashSet<IpAddr>) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };

    if trusted_proxies.contains(&peer) {
        let reported = forwarded_client(headers, trusted_proxies).or_else(|| header_ip(headers, "x-real-ip"));
        if let Some(ip) = reported {
            return ip.to_string();
        }
    }

    peer.to_string()
}

fn forwarded_client(headers: &HeaderMap, trusted_proxies: &HashSet<IpAddr>) -> Option<IpAddr> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let mut client = None;
    for hop in value.rsplit(',') {
        let ip = hop.trim().parse::<IpAddr>().ok()?;
        client = Some(ip);
        if !trusted_proxies.contains(&ip) {
            break;
        }
    }
    client
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

pub fn apply_security_headers(headers: &mut HeaderMap) {
    for &(name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
}

// Abuse gate first, then the session gate for protected pages
pub async fn gate_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    REQUESTS_EVALUATED.inc();

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, &state.gate.config().trusted_proxies);
    let path = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Err(err) = state.gate.evaluate(&ip, &path, user_agent, Utc::now()) {
        record_block(err.reason());
        debug!(ip = %ip, path = %path, reason = %err.reason(), "request blocked");
        return err.into_response();
    }

    if session::requires_session(&path) {
        let current = state.sessions.lookup(req.headers()).await;
        if let Access::Redirect(location) = session::authorize(&path, &current) {
            debug!(path = %path, location = %location, "session gate redirect");
            return Redirect::temporary(&location).into_response();
        }
    }

    REQUESTS_ALLOWED.inc();
    let whitelisted = state.gate.is_whitelisted(&ip);
    let mut response = next.run(req).await;
    if !whitelisted {
        apply_security_headers(response.headers_mut());
    }
    response
}
