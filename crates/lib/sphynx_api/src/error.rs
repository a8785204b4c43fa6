//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sphynx_core::agents::AgentError;
use sphynx_core::auth::AuthError;
use sphynx_core::store::StoreError;
use sphynx_core::users::UserError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Body of every token failure, whatever the cause.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// The uniform 401 for any token problem.
    pub fn invalid_token() -> Self {
        AppError::Unauthorized(INVALID_TOKEN_MESSAGE.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken | AuthError::TokenKindMismatch => AppError::invalid_token(),
            AuthError::UserNotFound => AppError::NotFound("User not found".into()),
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::EmailTaken => AppError::Conflict("Email already in use".into()),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AgentError> for AppError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::AgentNotFound => AppError::NotFound("Agent not found".into()),
            AgentError::UserNotFound => AppError::NotFound("User not found".into()),
            e @ AgentError::InvalidAgentName => AppError::Validation(e.to_string()),
            AgentError::InvalidConfig(msg) => AppError::Validation(msg),
            e @ AgentError::TokenExhausted => AppError::Internal(e.to_string()),
            AgentError::Store(e) => AppError::from(e),
        }
    }
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound => AppError::NotFound("User not found".into()),
            UserError::EmailTaken => AppError::Conflict("Email already in use".into()),
            UserError::Validation(msg) => AppError::Validation(msg),
            UserError::Store(e) => AppError::from(e),
            UserError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
