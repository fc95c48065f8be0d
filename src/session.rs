use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use reqwest::Url;
use tracing::debug;

use crate::models::Session;

// Pages that need a signed-in user
const PROTECTED_PREFIXES: &[&str] = &["/settings", "/library", "/history"];

// Pages that need the admin role
const ADMIN_PREFIXES: &[&str] = &["/admin/dashboard"];

const LOGIN_PATH: &str = "/login";
const ADMIN_LOGIN_PATH: &str = "/admin/login";
const ADMIN_ROLE: &str = "admin";

/// Where the site keeps track of who is signed in.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn lookup(&self, headers: &HeaderMap) -> Session;
}

/// Asks the upstream site about the session carried by the request cookies.
pub struct UpstreamSessions {
    client: reqwest::Client,
    endpoint: String,
}

impl UpstreamSessions {
    pub fn new(client: reqwest::Client, upstream: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/auth/session", upstream.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SessionLookup for UpstreamSessions {
    async fn lookup(&self, headers: &HeaderMap) -> Session {
        let mut request = self.client.get(&self.endpoint);
        if let Some(cookie) = headers.get(header::COOKIE) {
            request = request.header(header::COOKIE, cookie.clone());
        }

        let response = match request.send().await {
            Ok(res) if res.status().is_success() => res,
            Ok(res) => {
                debug!(status = %res.status(), "session lookup rejected");
                return Session::default();
            }
            Err(e) => {
                debug!(error = %e, "session lookup failed");
                return Session::default();
            }
        };

        response.json::<Session>().await.unwrap_or_else(|e| {
            debug!(error = %e, "session payload unreadable");
            Session::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(String),
}

fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn is_admin(path: &str) -> bool {
    ADMIN_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Whether `path` needs a session lookup at all.
pub fn requires_session(path: &str) -> bool {
    is_protected(path) || is_admin(path)
}

fn login_redirect(path: &str) -> String {
    // base only serves to borrow Url's query encoding
    match Url::parse("http://gate.local/") {
        Ok(mut url) => {
            url.set_path(LOGIN_PATH);
            url.query_pairs_mut().append_pair("redirect", path);
            format!("{}?{}", url.path(), url.query().unwrap_or_default())
        }
        Err(_) => LOGIN_PATH.to_string(),
    }
}

pub fn authorize(path: &str, session: &Session) -> Access {
    if is_protected(path) && !session.authenticated {
        return Access::Redirect(login_redirect(path));
    }

    if is_admin(path) {
        if !session.authenticated {
            return Access::Redirect(ADMIN_LOGIN_PATH.to_string());
        }
        if session.role != ADMIN_ROLE {
            return Access::Redirect("/".to_string());
        }
    }

    Access::Allow
}
