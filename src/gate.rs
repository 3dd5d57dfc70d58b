//! Request-level session gate.
//!
//! Routing decision only: the gate looks at whether a session cookie is
//! present, never at whether it verifies. Handlers that need an identity call
//! `AuthService::verify_session` themselves.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::{auth::session_token, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    ProtectedPage,
    ProtectedApi,
    AuthOnly,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    RedirectToLogin { location: String },
    RedirectToLanding { location: String },
    Unauthorized,
}

/// Which paths need a session and where to send people.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub protected_pages: Vec<String>,
    pub protected_apis: Vec<String>,
    pub auth_prefix: String,
    pub login_path: String,
    pub landing_path: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            protected_pages: owned(&["/dashboard", "/admin", "/profile", "/settings"]),
            protected_apis: owned(&["/api/users", "/api/profile", "/api/admin"]),
            auth_prefix: "/auth/".into(),
            login_path: "/auth/login".into(),
            landing_path: "/dashboard".into(),
        }
    }
}

/// `/admin` matches `/admin` and `/admin/...`, not `/administrator`.
/// A prefix ending in `/` only matches paths beneath it.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

impl RoutePolicy {
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.protected_apis.iter().any(|p| under(path, p)) {
            RouteClass::ProtectedApi
        } else if self.protected_pages.iter().any(|p| under(path, p)) {
            RouteClass::ProtectedPage
        } else if under(path, &self.auth_prefix) {
            RouteClass::AuthOnly
        } else {
            RouteClass::Public
        }
    }

    fn login_location(&self, callback: &str) -> String {
        match serde_urlencoded::to_string([("callbackUrl", callback)]) {
            Ok(query) => format!("{}?{}", self.login_path, query),
            Err(_) => self.login_path.clone(),
        }
    }
}

pub fn decide(policy: &RoutePolicy, path: &str, has_session: bool) -> GateDecision {
    match (policy.classify(path), has_session) {
        (RouteClass::ProtectedPage, false) => GateDecision::RedirectToLogin {
            location: policy.login_location(path),
        },
        (RouteClass::ProtectedApi, false) => GateDecision::Unauthorized,
        (RouteClass::AuthOnly, true) => GateDecision::RedirectToLanding {
            location: policy.landing_path.clone(),
        },
        _ => GateDecision::Continue,
    }
}

pub async fn session_gate(
    State(policy): State<Arc<RoutePolicy>>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let has_session = session_token(&jar).is_some();

    match decide(&policy, &path, has_session) {
        GateDecision::Continue => next.run(req).await,
        GateDecision::RedirectToLogin { location } => {
            debug!(%path, "no session; redirecting to login");
            Redirect::temporary(&location).into_response()
        }
        GateDecision::RedirectToLanding { location } => {
            debug!(%path, "already signed in; leaving auth page");
            Redirect::temporary(&location).into_response()
        }
        GateDecision::Unauthorized => {
            debug!(%path, "no session for protected api");
            error::unauthorized()
        }
    }
}
