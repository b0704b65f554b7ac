use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{download_record, operation_log};

use super::shared::Pagination;

/// One operation log entry.
#[derive(Serialize, utoipa::ToSchema)]
pub struct OperationLogItem {
    #[schema(example = 120)]
    pub id: i32,
    /// Acting account, null when the operation failed before identity
    /// was resolved.
    #[schema(example = 42)]
    pub user_id: Option<i32>,
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "UPLOAD")]
    pub op_code: String,
    #[schema(example = "Uploaded 4 files to merchant 3")]
    pub details: String,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub created_at: DateTime<Utc>,
}

impl OperationLogItem {
    pub fn from_model(m: operation_log::Model, username: Option<String>) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            username,
            op_code: m.op_code,
            details: m.details,
            created_at: m.created_at,
        }
    }
}

/// Query parameters for the operation log listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct OperationLogQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
    /// Restrict to one acting account.
    #[param(example = 42)]
    pub user_id: Option<i32>,
}

/// Paginated operation log, newest first.
#[derive(Serialize, utoipa::ToSchema)]
pub struct OperationLogListResponse {
    pub items: Vec<OperationLogItem>,
    pub pagination: Pagination,
}

/// One download ledger row.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DownloadRecordItem {
    #[schema(example = 55)]
    pub id: i32,
    #[schema(example = 7)]
    pub file_id: i32,
    /// Original name of the downloaded file, null if the row outlived it.
    #[schema(example = "storefront.jpg")]
    pub original_name: Option<String>,
    #[schema(example = 3)]
    pub merchant_id: i32,
    #[schema(example = "north_cafe")]
    pub merchant_username: Option<String>,
    /// `single` or `batch`.
    #[schema(example = "batch")]
    pub download_type: String,
    /// `success` or `failed`.
    #[schema(example = "success")]
    pub status: String,
    /// Spooled archive for batch attempts, null for single ones.
    pub archive_path: Option<String>,
    pub error_message: Option<String>,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub download_time: DateTime<Utc>,
}

impl DownloadRecordItem {
    pub fn from_model(
        m: download_record::Model,
        original_name: Option<String>,
        merchant_username: Option<String>,
    ) -> Self {
        Self {
            id: m.id,
            file_id: m.file_id,
            original_name,
            merchant_id: m.merchant_id,
            merchant_username,
            download_type: m.download_type,
            status: m.status,
            archive_path: m.archive_path,
            error_message: m.error_message,
            download_time: m.download_time,
        }
    }
}

/// Query parameters for the download ledger listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DownloadRecordQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
    /// Restrict to one merchant.
    #[param(example = 3)]
    pub merchant_id: Option<i32>,
    /// Restrict to one file.
    #[param(example = 7)]
    pub file_id: Option<i32>,
}

/// Paginated download ledger, newest first.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DownloadRecordListResponse {
    pub items: Vec<DownloadRecordItem>,
    pub pagination: Pagination,
}
