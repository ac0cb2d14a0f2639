//! Cookie parsing and building for authentication.

use axum::http::header;

/// Cookie name for the server-side session identifier.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Cookie name for the encrypted refresh credential (long-lived, 60 days by default).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find_map(|(key, value)| (key.trim() == name).then_some(value.trim()))
}

/// Build a Set-Cookie value with the attributes all auth cookies share.
/// `max_age` of `None` produces a browser-session cookie.
pub fn build_cookie(name: &str, value: &str, max_age: Option<u64>, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    match max_age {
        Some(age) => format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
            name, value, age, secure
        ),
        None => format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/{}",
            name, value, secure
        ),
    }
}

/// Build a Set-Cookie value that removes the named cookie.
pub fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", Some(0), secure)
}
