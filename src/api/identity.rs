//! Caller identity from gateway-verified headers.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::user::AuthenticatedUser;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The signed-in caller, or `None` when any required header is missing.
pub fn caller(headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let id = header(headers, USER_ID_HEADER)?;
    let email = header(headers, USER_EMAIL_HEADER)?;
    let token = header(headers, AUTHORIZATION.as_str())?
        .strip_prefix("Bearer ")?
        .trim();
    if token.is_empty() {
        return None;
    }

    let user = AuthenticatedUser::new(id, email, token);
    Some(match header(headers, USER_NAME_HEADER) {
        Some(name) => user.with_display_name(name),
        None => user,
    })
}
