//! Cookie service: set and clear the httpOnly session cookie.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie carrying the session token.
pub const JWT_COOKIE: &str = "JWT";

/// Build the httpOnly session cookie.
pub fn auth_cookie(token: &str, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
    Cookie::build((JWT_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::seconds(max_age))
        .build()
}

/// Build an expired session cookie to clear auth state.
pub fn clear_auth_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((JWT_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}
