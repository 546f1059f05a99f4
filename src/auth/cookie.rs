use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::{CookieConfig, SESSION_COOKIE};

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then_some(v.trim())
        })
        .find(|v| !v.is_empty())
}

pub fn session_cookie(cfg: &CookieConfig, token: &str, max_age_secs: u64) -> HeaderValue {
    build(cfg, token, max_age_secs)
}

pub fn clear_session_cookie(cfg: &CookieConfig) -> HeaderValue {
    build(cfg, "", 0)
}

fn build(cfg: &CookieConfig, value: &str, max_age_secs: u64) -> HeaderValue {
    let mut s = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if cfg.secure {
        s.push_str("; Secure");
    }
    // Token charset is base64url plus '.', always a valid header value.
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static("auth-token=; Path=/; Max-Age=0"))
}
