use std::sync::Arc;

use axum::{
    extract::{FromRef, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use super::{
    cookie::{clear_session_cookie, get_cookie, SESSION_COOKIE_NAME},
    jwt::JwtKeys,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a valid session.
    Protected,
    /// Login and signup pages; signed-in users are sent home.
    AuthOnly,
    Public,
}

/// Path prefixes the guard acts on. Prefixes match whole segments, so
/// `/dashboard` covers `/dashboard/notes` but not `/dashboards`.
#[derive(Debug, Clone)]
pub struct RouteRules {
    pub protected: Vec<String>,
    pub auth_only: Vec<String>,
    /// Passed through without inspection.
    pub excluded: Vec<String>,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            protected: vec!["/dashboard".into(), "/profile".into()],
            auth_only: vec!["/login".into(), "/signup".into()],
            excluded: vec!["/api".into(), "/static".into(), "/favicon.ico".into()],
        }
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

impl RouteRules {
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|p| matches_prefix(path, p))
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        if self.protected.iter().any(|p| matches_prefix(path, p)) {
            RouteClass::Protected
        } else if self.auth_only.iter().any(|p| matches_prefix(path, p)) {
            RouteClass::AuthOnly
        } else {
            RouteClass::Public
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect {
        to: &'static str,
        clear_cookie: bool,
    },
}

/// Decides what to do with a request given its route class and session cookie.
pub fn decide(class: RouteClass, token: Option<&str>, keys: &JwtKeys) -> GuardDecision {
    let Some(token) = token else {
        return match class {
            RouteClass::Protected => GuardDecision::Redirect {
                to: "/login",
                clear_cookie: false,
            },
            _ => GuardDecision::Allow,
        };
    };

    let valid = keys.verify(token).is_ok();
    match (class, valid) {
        (RouteClass::AuthOnly, true) => GuardDecision::Redirect {
            to: "/",
            clear_cookie: false,
        },
        (RouteClass::Protected, false) => GuardDecision::Redirect {
            to: "/login",
            clear_cookie: true,
        },
        _ => GuardDecision::Allow,
    }
}

/// Everything the guard may touch: the token keys and the route rules.
#[derive(Clone)]
pub struct GuardState {
    pub keys: JwtKeys,
    pub rules: Arc<RouteRules>,
}

impl FromRef<AppState> for GuardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            keys: state.keys.clone(),
            rules: state.rules.clone(),
        }
    }
}

/// Middleware run before every page handler.
pub async fn route_guard(
    State(guard): State<GuardState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if guard.rules.is_excluded(&path) {
        return next.run(request).await;
    }

    let class = guard.rules.classify(&path);
    let decision = decide(
        class,
        get_cookie(request.headers(), SESSION_COOKIE_NAME),
        &guard.keys,
    );
    match decision {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect { to, clear_cookie } => {
            debug!(%path, to, clear_cookie, "route guard redirect");
            let mut response = Redirect::temporary(to).into_response();
            if clear_cookie {
                response
                    .headers_mut()
                    .insert(header::SET_COOKIE, clear_session_cookie());
            }
            response
        }
    }
}
