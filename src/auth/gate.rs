//! Session gate for page routes.
//!
//! Every request passes through here. Public paths go straight through; API
//! paths are guarded per handler by [`AuthUser`](super::extractors::AuthUser)
//! and [`AdminUser`](super::extractors::AdminUser). Everything else needs a
//! valid session cookie:
//!
//! - no cookie: redirect to `/login?callbackUrl=<original path>`
//! - bad or expired token: clear the cookie, same redirect
//! - valid token: forward with `x-user-id` / `x-user-role` headers and an
//!   [`Identity`] extension
//! - `/admin` paths additionally need the `ADMIN` role, otherwise
//!   redirect to `/unauthorized`

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use super::{
    claims::Identity,
    cookie::{clear_session_cookie, read_cookie},
    jwt::JwtKeys,
};
use crate::{config::SESSION_COOKIE, state::AppState};

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");

pub const LOGIN_PATH: &str = "/login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

const PUBLIC_PATHS: &[&str] = &["/", "/login", "/register", "/unauthorized", "/health"];
const PUBLIC_PREFIXES: &[&str] = &["/api/", "/uploads/"];

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub fn is_admin_path(path: &str) -> bool {
    path == "/admin" || path.starts_with("/admin/")
}

/// `/login?callbackUrl=...` for the given original path (and query).
pub fn login_redirect_target(original: &str) -> String {
    format!("{LOGIN_PATH}?callbackUrl={}", encode_component(original))
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub async fn session_gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_public(&path) {
        return next.run(req).await;
    }

    let original = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let Some(token) = read_cookie(req.headers(), SESSION_COOKIE) else {
        debug!(%path, "no session cookie; redirecting to login");
        return Redirect::to(&login_redirect_target(&original)).into_response();
    };

    let keys = JwtKeys::from_config(&state.config.jwt);
    let claims = match keys.verify(token) {
        Ok(c) => c,
        Err(e) => {
            warn!(%path, error = %e, "rejected session token; clearing cookie");
            return (
                AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config.cookie))]),
                Redirect::to(&login_redirect_target(&original)),
            )
                .into_response();
        }
    };

    let identity = Identity::from(&claims);
    if is_admin_path(&path) && !identity.role.is_admin() {
        warn!(%path, user_id = %identity.user_id, "non-admin on admin page");
        return Redirect::to(UNAUTHORIZED_PATH).into_response();
    }

    let headers = req.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&identity.user_id.to_string()) {
        headers.insert(USER_ID_HEADER, v);
    }
    headers.insert(USER_ROLE_HEADER, HeaderValue::from_static(identity.role.as_str()));
    req.extensions_mut().insert(identity);

    next.run(req).await
}
