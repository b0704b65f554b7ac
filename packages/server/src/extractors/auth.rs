use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use sea_orm::EntityTrait;
use serde::Deserialize;

use crate::access::{AccountStatus, Principal, role_from_db};
use crate::entity::user;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Resolve a verified token against the current account row.
///
/// The role and status come from the database, not the claims, so a
/// disabled account loses access mid-session and a role change takes
/// effect without re-login.
async fn load_principal(state: &AppState, token: &str) -> Result<Principal, AppError> {
    let claims = jwt::verify(token, &state.config.auth.jwt_secret)
        .map_err(|_| AppError::TokenInvalid)?;

    let account = user::Entity::find_by_id(claims.uid)
        .one(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    if account.status == AccountStatus::Disabled.as_str() {
        return Err(AppError::AccountDisabled);
    }

    Ok(Principal {
        id: account.id,
        username: account.username,
        role: role_from_db(&account.role)?,
    })
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        load_principal(state, token).await
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Authenticated caller for download endpoints.
///
/// Accepts the usual `Authorization: Bearer` header, or a `?token=` query
/// parameter so a plain browser link can fetch a file.
pub struct DownloadPrincipal(pub Principal);

impl FromRequestParts<AppState> for DownloadPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_token = match parts.headers.get("Authorization") {
            Some(value) => {
                let value = value.to_str().map_err(|_| AppError::TokenInvalid)?;
                Some(
                    value
                        .strip_prefix("Bearer ")
                        .ok_or(AppError::TokenInvalid)?
                        .to_string(),
                )
            }
            None => None,
        };

        let token = match header_token {
            Some(token) => token,
            None => Query::<TokenQuery>::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|Query(q)| q.token)
                .ok_or(AppError::TokenMissing)?,
        };

        let principal = load_principal(state, &token).await?;
        Ok(DownloadPrincipal(principal))
    }
}
