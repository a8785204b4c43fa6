//! Authentication middleware: session token from the `Authorization: Bearer`
//! header or the `JWT` cookie.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use sphynx_core::auth::AuthError;
use sphynx_core::models::{TokenKind, User};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::JWT_COOKIE;

/// The resolved caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Bearer header first, then the cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(JWT_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Axum middleware: resolves an `AUTH` token to its user and injects
/// [`AuthenticatedUser`].
///
/// Every token problem, including a token whose user is gone or disabled,
/// yields the same 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let user = match state.tokens.resolve_user(&token, TokenKind::Auth).await {
        Ok(user) => user,
        Err(AuthError::Store(e)) => return Err(AppError::from(e)),
        Err(e) => {
            debug!("Rejected session token: {e}");
            return Err(AppError::invalid_token());
        }
    };
    if !user.can_sign_in() {
        debug!(user_id = %user.id, "Rejected session for disabled account");
        return Err(AppError::invalid_token());
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Axum middleware: admits only admins. Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .is_some_and(|u| u.0.is_admin());
    if !is_admin {
        return Err(AppError::Forbidden("Admin role required".into()));
    }
    Ok(next.run(request).await)
}
