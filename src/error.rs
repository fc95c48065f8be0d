use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorBody;

/// Gate verdicts that stop a request before it reaches the site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Identity-list or heuristic rejection.
    #[error("forbidden: {0}")]
    Forbidden(BlockReason),

    /// Rate, burst or active suspicion block. Retryable once the window elapses.
    #[error("too many requests: {0}")]
    TooManyRequests(BlockReason),
}

/// Which rule produced a block. Never exposed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Blacklist,
    Suspicion,
    IpRate,
    PathRate,
    UserAgent,
    Flood,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blacklist => "blacklist",
            Self::Suspicion => "suspicion",
            Self::IpRate => "ip_rate",
            Self::PathRate => "path_rate",
            Self::UserAgent => "user_agent",
            Self::Flood => "flood",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn reason(&self) -> BlockReason {
        match self {
            Self::Forbidden(reason) | Self::TooManyRequests(reason) => *reason,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Forbidden(_) => "Forbidden",
            Self::TooManyRequests(_) => "Too Many Requests",
        };
        (self.status(), body).into_response()
    }
}

/// Failures of the human-verification flow. All share one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("invalid captcha token")]
    InvalidToken,

    #[error("captcha expired")]
    Expired,

    #[error("wrong captcha answer")]
    WrongAnswer,
}

impl IntoResponse for ChallengeError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "proxy failure");
        } else {
            tracing::debug!(error = %self, "request body rejected");
        }
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid path limit {0:?}, expected PREFIX=LIMIT")]
    PathLimit(String),
}
