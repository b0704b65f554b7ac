use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{AccountStatus, Role};
use crate::entity::user;
use crate::error::AppError;

use super::shared::Pagination;

/// Request body for creating an account.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateUserRequest {
    /// Unique username (1-32 chars, alphanumeric and underscores).
    #[schema(example = "north_cafe")]
    pub username: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    /// One of `admin`, `sub_admin`, `merchant`, `customer`.
    #[schema(example = "merchant")]
    pub role: String,
}

pub fn validate_create_user(payload: &CreateUserRequest) -> Result<Role, AppError> {
    let username = payload.username.trim();
    if username.is_empty() || username.chars().count() > 32 {
        return Err(AppError::Validation(
            "Username must be 1-32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "Username must contain only letters, digits, and underscores".into(),
        ));
    }
    validate_password(&payload.password)?;
    payload.role.parse().map_err(AppError::Validation)
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

/// One account in the administration listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "north_cafe")]
    pub username: String,
    #[schema(example = "merchant")]
    pub role: String,
    /// `active` or `disabled`.
    #[schema(example = "active")]
    pub status: String,
    /// Reason given when the account was disabled.
    pub disable_reason: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            role: m.role,
            status: m.status,
            disable_reason: m.disable_reason,
            last_login: m.last_login,
            created_at: m.created_at,
        }
    }
}

/// Query parameters for the account listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct UserListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
}

/// Paginated account listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserListResponse {
    pub items: Vec<UserResponse>,
    pub pagination: Pagination,
}

/// Request body for disabling or re-enabling an account.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct SetUserStatusRequest {
    /// `active` or `disabled`.
    #[schema(example = "disabled")]
    pub status: String,
    /// Required when disabling; ignored when enabling.
    #[schema(example = "Repeated abuse reports")]
    pub reason: Option<String>,
}

/// Parse and cross-check a status change request.
///
/// Disabling requires a non-empty reason; enabling discards any reason.
pub fn validate_set_status(
    payload: &SetUserStatusRequest,
) -> Result<(AccountStatus, Option<String>), AppError> {
    let status: AccountStatus = payload.status.parse().map_err(AppError::Validation)?;
    match status {
        AccountStatus::Disabled => {
            let reason = payload
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("A reason is required to disable an account".into())
                })?;
            Ok((status, Some(reason.to_string())))
        }
        AccountStatus::Active => Ok((status, None)),
    }
}

/// Request body for an administrative password reset.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    /// New password (8-128 characters).
    #[schema(example = "n3w_P@ssword!")]
    pub new_password: String,
}
