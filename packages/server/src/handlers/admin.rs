use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use sea_orm::*;
use tracing::instrument;

use crate::access::{AccountStatus, Principal};
use crate::audit::OpCode;
use crate::entity::{download_record, file_asset, operation_log, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::ApiJson;
use crate::filters::{
    apply_time_window, default_file_order, process_status_filter, resolve_time_window, PageParams,
};
use crate::models::audit::{
    DownloadRecordItem, DownloadRecordListResponse, DownloadRecordQuery, OperationLogItem,
    OperationLogListResponse, OperationLogQuery,
};
use crate::models::photo::{AdminPhotoItem, AdminPhotoListQuery, AdminPhotoListResponse};
use crate::models::shared::Pagination;
use crate::models::user::{
    validate_create_user, validate_password, validate_set_status, CreateUserRequest,
    ResetPasswordRequest, SetUserStatusRequest, UserListQuery, UserListResponse, UserResponse,
};
use crate::state::AppState;
use crate::utils::hash;

use super::usernames_for;

#[utoipa::path(
    get,
    path = "/photos",
    tag = "Admin",
    operation_id = "listAllPhotos",
    summary = "List files across all accounts",
    description = "Unrestricted paginated file listing with the same filters as the customer \
        and merchant views, plus owner and merchant filters. Admin only.",
    params(AdminPhotoListQuery),
    responses(
        (status = 200, description = "File listing", body = AdminPhotoListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(user_id = principal.id))]
pub async fn list_all_photos(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<AdminPhotoListQuery>,
) -> Result<Json<AdminPhotoListResponse>, AppError> {
    principal.require_admin()?;

    let page = PageParams::from_query(query.page, query.limit);
    let window = resolve_time_window(
        query.time_filter.as_deref(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        Utc::now(),
    )?;

    let mut select = file_asset::Entity::find();
    if let Some(owner_id) = query.owner_id {
        select = select.filter(file_asset::Column::OwnerId.eq(owner_id));
    }
    if let Some(merchant_id) = query.merchant_id {
        select = select.filter(file_asset::Column::MerchantId.eq(merchant_id));
    }
    if let Some(status) = process_status_filter(query.status.as_deref()) {
        select = select.filter(file_asset::Column::ProcessStatus.eq(status.as_str()));
    }
    select = apply_time_window(select, window);

    let total = select.clone().count(&state.db).await?;
    let rows = default_file_order(select)
        .offset(page.offset())
        .limit(page.limit)
        .all(&state.db)
        .await?;

    let usernames = usernames_for(
        &state.db,
        rows.iter().flat_map(|r| [r.owner_id, r.merchant_id]),
    )
    .await?;
    let items = rows
        .into_iter()
        .map(|m| {
            let owner_username = usernames.get(&m.owner_id).cloned();
            let merchant_username = usernames.get(&m.merchant_id).cloned();
            AdminPhotoItem::from_model(m, owner_username, merchant_username)
        })
        .collect();

    Ok(Json(AdminPhotoListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Admin",
    operation_id = "listUsers",
    summary = "List accounts",
    description = "Paginated account listing: the caller's own account first, then admins, \
        sub-admins, merchants and customers, newest first within each group. Sub-admins see \
        merchants, customers and themselves.",
    params(UserListQuery),
    responses(
        (status = 200, description = "Account listing", body = UserListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(user_id = principal.id))]
pub async fn list_users(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let page = PageParams::from_query(query.page, query.limit);

    let select = principal.visible_users_query()?;
    let total = select.clone().count(&state.db).await?;
    let rows = select
        .offset(page.offset())
        .limit(page.limit)
        .all(&state.db)
        .await?;

    let items = rows.into_iter().map(UserResponse::from).collect();

    Ok(Json(UserListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Admin",
    operation_id = "createUser",
    summary = "Create an account",
    description = "Creates an account with the given role. Admins may create any role; \
        sub-admins only merchants and customers.",
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Username already taken (USERNAME_TAKEN)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(user_id = principal.id, username = %payload.username))]
pub async fn create_user(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_admin_tier()?;

    let role = validate_create_user(&payload)?;
    if !principal.can_administer(role) {
        return Err(AppError::PermissionDenied);
    }

    let password = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;

    let new_user = user::ActiveModel {
        username: Set(payload.username.trim().to_string()),
        password: Set(password),
        role: Set(role.as_str().to_string()),
        status: Set(AccountStatus::Active.as_str().to_string()),
        disable_reason: Set(None),
        last_login: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let created = new_user.insert(&state.db).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            tracing::debug!("Account creation race: unique constraint caught on insert");
            AppError::UsernameTaken
        }
        _ => AppError::from(e),
    })?;

    state.audit.record(
        Some(principal.id),
        OpCode::CreateUser,
        format!("Created {} account '{}'", role, created.username),
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from(created))))
}

#[utoipa::path(
    put,
    path = "/users/{id}/status",
    tag = "Admin",
    operation_id = "setUserStatus",
    summary = "Disable or enable an account",
    description = "Disabling requires a reason and locks the account out on its next request. \
        Enabling clears the stored reason. The primary administrator account cannot be touched; \
        sub-admins cannot touch admin-tier accounts.",
    params(("id" = i32, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account updated", body = UserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Account not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(user_id = principal.id, target_id = id))]
pub async fn set_user_status(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ApiJson(payload): ApiJson<SetUserStatusRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let (status, reason) = validate_set_status(&payload)?;

    let target = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    principal.check_status_change(&target)?;

    let username = target.username.clone();
    let mut active: user::ActiveModel = target.into();
    active.status = Set(status.as_str().to_string());
    active.disable_reason = Set(reason);
    let updated = active.update(&state.db).await?;

    state.audit.record(
        Some(principal.id),
        OpCode::SetUserStatus,
        format!("Set account '{username}' to {status}"),
    );

    Ok(Json(UserResponse::from(updated)))
}

#[utoipa::path(
    put,
    path = "/users/{id}/password",
    tag = "Admin",
    operation_id = "resetPassword",
    summary = "Reset an account's password",
    description = "Replaces the stored password hash. Admins may reset anyone; sub-admins may \
        reset merchants, customers and their own account.",
    params(("id" = i32, Path, description = "Account id")),
    responses(
        (status = 204, description = "Password reset"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Account not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(user_id = principal.id, target_id = id))]
pub async fn reset_password(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_password(&payload.new_password)?;

    let target = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    principal.check_password_reset(&target)?;

    let password = hash::hash_password(&payload.new_password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;

    let username = target.username.clone();
    let mut active: user::ActiveModel = target.into();
    active.password = Set(password);
    active.update(&state.db).await?;

    state.audit.record(
        Some(principal.id),
        OpCode::ResetPassword,
        format!("Reset password of account '{username}'"),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/operation-logs",
    tag = "Admin",
    operation_id = "listOperationLogs",
    summary = "List the operation log",
    description = "Append-only record of every state-changing operation and login attempt, \
        newest first. Admins and sub-admins.",
    params(OperationLogQuery),
    responses(
        (status = 200, description = "Operation log", body = OperationLogListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(user_id = principal.id))]
pub async fn list_operation_logs(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<OperationLogQuery>,
) -> Result<Json<OperationLogListResponse>, AppError> {
    principal.require_admin_tier()?;

    let page = PageParams::from_query(query.page, query.limit);

    let mut select = operation_log::Entity::find();
    if let Some(user_id) = query.user_id {
        select = select.filter(operation_log::Column::UserId.eq(user_id));
    }

    let total = select.clone().count(&state.db).await?;
    let rows = select
        .order_by_desc(operation_log::Column::CreatedAt)
        .order_by_desc(operation_log::Column::Id)
        .offset(page.offset())
        .limit(page.limit)
        .all(&state.db)
        .await?;

    let usernames = usernames_for(&state.db, rows.iter().filter_map(|r| r.user_id)).await?;
    let items = rows
        .into_iter()
        .map(|m| {
            let username = m.user_id.and_then(|id| usernames.get(&id).cloned());
            OperationLogItem::from_model(m, username)
        })
        .collect();

    Ok(Json(OperationLogListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

#[utoipa::path(
    get,
    path = "/download-records",
    tag = "Admin",
    operation_id = "listDownloadRecords",
    summary = "List the download ledger",
    description = "Append-only record of every download attempt, newest first, decorated with \
        file and merchant names where they still exist. Admin only.",
    params(DownloadRecordQuery),
    responses(
        (status = 200, description = "Download ledger", body = DownloadRecordListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(user_id = principal.id))]
pub async fn list_download_records(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<DownloadRecordQuery>,
) -> Result<Json<DownloadRecordListResponse>, AppError> {
    principal.require_admin()?;

    let page = PageParams::from_query(query.page, query.limit);

    let mut select = download_record::Entity::find();
    if let Some(merchant_id) = query.merchant_id {
        select = select.filter(download_record::Column::MerchantId.eq(merchant_id));
    }
    if let Some(file_id) = query.file_id {
        select = select.filter(download_record::Column::FileId.eq(file_id));
    }

    let total = select.clone().count(&state.db).await?;
    let rows = select
        .order_by_desc(download_record::Column::DownloadTime)
        .order_by_desc(download_record::Column::Id)
        .offset(page.offset())
        .limit(page.limit)
        .all(&state.db)
        .await?;

    let file_names = file_names_for(&state.db, rows.iter().map(|r| r.file_id)).await?;
    let usernames = usernames_for(&state.db, rows.iter().map(|r| r.merchant_id)).await?;

    let items = rows
        .into_iter()
        .map(|m| {
            let original_name = file_names.get(&m.file_id).cloned();
            let merchant_username = usernames.get(&m.merchant_id).cloned();
            DownloadRecordItem::from_model(m, original_name, merchant_username)
        })
        .collect();

    Ok(Json(DownloadRecordListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

/// Resolve file ids to original names for ledger decoration.
async fn file_names_for<C, I>(db: &C, ids: I) -> Result<HashMap<i32, String>, AppError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let ids: HashSet<i32> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, String)> = file_asset::Entity::find()
        .select_only()
        .column(file_asset::Column::Id)
        .column(file_asset::Column::OriginalName)
        .filter(file_asset::Column::Id.is_in(ids))
        .into_tuple()
        .all(db)
        .await?;

    Ok(rows.into_iter().collect())
}
