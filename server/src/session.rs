//! Session cookie handling for the /ws endpoint.
//!
//! The cookie is audit-only: it identifies a browser, not a peer.
//! Each upgrade still mints a fresh user id.

use axum::http::{header, HeaderMap};

pub const SESSION_COOKIE: &str = "signaling_session";

const SESSION_MAX_AGE_SECS: u64 = 86_400;

/// Pull the session id out of the request's Cookie header, if present.
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// Set-Cookie value for a newly minted session id.
pub fn session_cookie(session_id: &str) -> String {
    format!(
        "{SESSION_COOKIE}={session_id}; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    )
}
