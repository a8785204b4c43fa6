//! Admin-only user administration handlers.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use sphynx_core::users::{NewUser, UserUpdate};

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    CreateUserRequest, MessageResponse, PageResponse, UpdateUserRequest, UserIdQuery, UserQuery,
    UserResponse,
};

/// `GET /api/v1/user/get`: one user by `userId` or `email`, otherwise a page
/// of users.
pub async fn get_users_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PageResponse<UserResponse>>> {
    let (page, size, offset) = query.paging().resolve();
    let users = if let Some(id) = query.user_id {
        vec![state.users.get(id).await?]
    } else if let Some(email) = query.email.as_deref() {
        vec![state.users.get_by_email(email).await?]
    } else {
        state.users.list(offset, size).await?
    };
    Ok(Json(PageResponse {
        items: users.into_iter().map(UserResponse::from).collect(),
        page,
        size,
    }))
}

/// `POST /api/v1/user/create`
pub async fn create_user_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = state
        .users
        .create(NewUser {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            password: body.password,
            enabled: body.enabled,
            account_non_expired: body.account_non_expired,
            account_non_locked: body.account_non_locked,
            credentials_non_expired: body.credentials_non_expired,
            roles: body.roles,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// `PATCH /api/v1/user/update?userId=`
pub async fn update_user_handler(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let update = UserUpdate {
        first_name: body.first_name,
        last_name: body.last_name,
        email: body.email,
        password: body.password,
        enabled: body.enabled,
        account_non_expired: body.account_non_expired,
        account_non_locked: body.account_non_locked,
        credentials_non_expired: body.credentials_non_expired,
        roles: body.roles,
    };
    let user = state.users.update(query.user_id, update).await?;
    Ok(Json(user.into()))
}

/// `DELETE /api/v1/user/delete?userId=`: also removes the user's agents.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Query(query): Query<UserIdQuery>,
) -> AppResult<Json<MessageResponse>> {
    state.users.delete(query.user_id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}
