use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, header},
    response::Response,
};
use http_body_util::LengthLimitError;

use crate::error::ProxyError;
use crate::metrics::UPSTREAM_LATENCY;
use crate::state::AppState;

// Largest request body forwarded to the site
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host" | "connection" | "content-length" | "transfer-encoding" | "keep-alive" | "upgrade"
    )
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn hit_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}

// Buffer the request body, refusing anything over `limit` bytes
async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    if declared_length(headers).is_some_and(|len| len > limit as u64) {
        return Err(ProxyError::PayloadTooLarge(limit));
    }
    to_bytes(body, limit).await.map_err(|err| {
        if hit_length_limit(&err) {
            ProxyError::PayloadTooLarge(limit)
        } else {
            ProxyError::Body(err)
        }
    })
}

// Forward an allowed request to the site and relay its answer
pub async fn proxy_handler(State(state): State<Arc<AppState>>, req: Request) -> Result<Response, ProxyError> {
    let start_time = Instant::now();

    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.upstream.trim_end_matches('/'), path_and_query);
    let body = read_body(&parts.headers, body, MAX_BODY_BYTES).await?;

    let upstream = state
        .client
        .request(parts.method.clone(), url)
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let bytes = upstream.bytes().await?;

    UPSTREAM_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
