//! Authentication request handlers.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use sphynx_core::accounts::{Session, SignUp};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    MessageResponse, RequestResetRequest, ResetPasswordRequest, ResetTokenQuery, SignInRequest,
    SignUpRequest, TokenResponse, UserResponse,
};
use crate::services::cookies::{auth_cookie, clear_auth_cookie};

fn token_response(session: Session) -> TokenResponse {
    TokenResponse {
        token: session.token,
        token_type: "Bearer".into(),
        expires_in: session.expires_in,
        user: session.user.into(),
    }
}

fn with_session_cookie(state: &AppState, jar: CookieJar, session: &Session) -> CookieJar {
    jar.add(auth_cookie(
        &session.token,
        session.expires_in,
        state.config.secure_cookies,
    ))
}

/// `POST /api/v1/auth/sign-up`: create an account and sign it in.
pub async fn sign_up_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SignUpRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<TokenResponse>)> {
    let session = state
        .accounts
        .register(SignUp {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
        })
        .await?;
    let jar = with_session_cookie(&state, jar, &session);
    Ok((StatusCode::CREATED, jar, Json(token_response(session))))
}

/// `POST /api/v1/auth/sign-in`: exchange email and password for a session.
pub async fn sign_in_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<SignInRequest>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let session = state.accounts.authenticate(&body.email, &body.password).await?;
    let jar = with_session_cookie(&state, jar, &session);
    Ok((jar, Json(token_response(session))))
}

/// `GET /api/v1/auth/sign-out`: clear the session cookie.
///
/// Tokens are stateless; a bearer token stays valid until it expires.
pub async fn sign_out_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(clear_auth_cookie(state.config.secure_cookies));
    (jar, Json(MessageResponse::new("Signed out")))
}

/// `POST /api/v1/auth/request-reset`: mail a reset token if the email is known.
pub async fn request_reset_handler(
    State(state): State<AppState>,
    Json(body): Json<RequestResetRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    state.accounts.request_password_reset(&body.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "If the email is registered, a reset token has been sent",
        )),
    ))
}

/// `POST /api/v1/auth/reset-password?resetToken=`: set a new password.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Query(query): Query<ResetTokenQuery>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .accounts
        .reset_password(&query.reset_token, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

/// `GET /api/v1/user/me`: the signed-in user.
pub async fn me_handler(
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> Json<UserResponse> {
    Json(user.0.into())
}
