use axum::{Json, extract::State};
use chrono::Utc;
use sea_orm::*;
use tracing::instrument;

use crate::access::{AccountStatus, Principal};
use crate::audit::OpCode;
use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::ApiJson;
use crate::models::auth::{LoginRequest, LoginResponse, MeResponse, validate_login_request};
use crate::state::AppState;
use crate::utils::{hash, jwt};

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log into an account",
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong username or password (INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 403, description = "Account disabled (ACCOUNT_DISABLED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    validate_login_request(&payload)?;

    let username = payload.username.trim();

    let Some(account) = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(&state.db)
        .await?
    else {
        state.audit.record(
            None,
            OpCode::LoginFailed,
            format!("Login attempt for unknown username '{username}'"),
        );
        return Err(AppError::InvalidCredentials);
    };

    let is_valid = hash::verify_password(&payload.password, &account.password)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;
    if !is_valid {
        state
            .audit
            .record(Some(account.id), OpCode::LoginFailed, "Wrong password");
        return Err(AppError::InvalidCredentials);
    }

    if account.status == AccountStatus::Disabled.as_str() {
        state.audit.record(
            Some(account.id),
            OpCode::LoginFailed,
            "Login rejected for disabled account",
        );
        return Err(AppError::AccountDisabled);
    }

    let token = jwt::sign(
        account.id,
        &account.username,
        &account.role,
        &state.config.auth.jwt_secret,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    let mut active: user::ActiveModel = account.clone().into();
    active.last_login = Set(Some(Utc::now()));
    active.update(&state.db).await?;

    state.audit.record(
        Some(account.id),
        OpCode::Login,
        format!("User '{}' logged in", account.username),
    );

    Ok(Json(LoginResponse {
        token,
        id: account.id,
        username: account.username,
        role: account.role,
    }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "me",
    summary = "Current account profile",
    responses(
        (status = 200, description = "Profile", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Account disabled (ACCOUNT_DISABLED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal), fields(user_id = principal.id))]
pub async fn me(
    principal: Principal,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, AppError> {
    let account = user::Entity::find_by_id(principal.id)
        .one(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    Ok(Json(MeResponse {
        id: account.id,
        username: account.username,
        role: account.role,
        last_login: account.last_login,
    }))
}
