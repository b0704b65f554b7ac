use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::file_asset;
use crate::error::AppError;
use crate::lifecycle::MAX_FILES_PER_UPLOAD;

use super::shared::Pagination;

/// One stored file in an upload manifest.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadedFile {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = "storefront.jpg")]
    pub original_name: String,
    /// Classified kind, `image` or `archive`.
    #[schema(example = "image")]
    pub file_type: String,
    #[schema(example = 204800)]
    pub size_bytes: i64,
}

/// Successful upload response: one manifest entry per stored file.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
}

/// Request body for the pre-flight duplicate check.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct DuplicateCheckRequest {
    /// Merchant the upload would target.
    #[schema(example = 3)]
    pub merchant_id: i32,
    /// Candidate original file names.
    #[schema(example = json!(["storefront.jpg", "menu.pdf.zip"]))]
    pub file_names: Vec<String>,
}

pub fn validate_duplicate_check(payload: &DuplicateCheckRequest) -> Result<(), AppError> {
    if payload.file_names.is_empty() {
        return Err(AppError::Validation("file_names must not be empty".into()));
    }
    if payload.file_names.len() > MAX_FILES_PER_UPLOAD {
        return Err(AppError::Validation(format!(
            "At most {MAX_FILES_PER_UPLOAD} file names can be checked at once"
        )));
    }
    if payload.file_names.iter().any(|name| name.trim().is_empty()) {
        return Err(AppError::Validation("File names must not be blank".into()));
    }
    Ok(())
}

/// Names already taken for the `(caller, merchant)` pair.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DuplicateCheckResponse {
    #[schema(example = json!(["storefront.jpg"]))]
    pub duplicate_files: Vec<String>,
}

/// Query parameters for the customer's own file listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PhotoListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
    /// Filter by process status (`received`, `processing`, `shipped`).
    /// Any other value is ignored.
    #[param(example = "received")]
    pub status: Option<String>,
    /// `today`, `week`, `month` or `custom`.
    #[param(example = "week")]
    pub time_filter: Option<String>,
    /// First day for `time_filter=custom`, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Last day for `time_filter=custom`, inclusive.
    pub end_date: Option<String>,
}

/// Query parameters for the merchant's received-file listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct MerchantPhotoListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
    /// Filter by process status (`received`, `processing`, `shipped`).
    /// Any other value is ignored.
    #[param(example = "received")]
    pub status: Option<String>,
    /// `today`, `week`, `month` or `custom`.
    #[param(example = "week")]
    pub time_filter: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Restrict to one uploading customer.
    #[param(example = 9)]
    pub customer_id: Option<i32>,
}

/// Query parameters for the admin file listing.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AdminPhotoListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 10)]
    pub limit: Option<u64>,
    /// Filter by process status (`received`, `processing`, `shipped`).
    /// Any other value is ignored.
    pub status: Option<String>,
    /// `today`, `week`, `month` or `custom`.
    pub time_filter: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Restrict to one uploading customer.
    pub owner_id: Option<i32>,
    /// Restrict to one receiving merchant.
    pub merchant_id: Option<i32>,
}

/// One row of the customer's own file listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CustomerPhotoItem {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = 3)]
    pub merchant_id: i32,
    /// Username of the receiving merchant.
    #[schema(example = "north_cafe")]
    pub merchant_username: Option<String>,
    #[schema(example = "storefront.jpg")]
    pub original_name: String,
    #[schema(example = "image")]
    pub file_type: String,
    #[schema(example = "image/jpeg")]
    pub mime_type: String,
    #[schema(example = 204800)]
    pub size_bytes: i64,
    /// Lifecycle status, `active` or `deleted`.
    #[schema(example = "active")]
    pub status: String,
    #[schema(example = "received")]
    pub process_status: String,
    pub remarks: Option<String>,
    /// Remark edits consumed so far (lifetime cap of 10).
    #[schema(example = 2)]
    pub edit_count: i32,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub upload_time: DateTime<Utc>,
}

impl CustomerPhotoItem {
    pub fn from_model(m: file_asset::Model, merchant_username: Option<String>) -> Self {
        Self {
            id: m.id,
            merchant_id: m.merchant_id,
            merchant_username,
            original_name: m.original_name,
            file_type: m.file_type,
            mime_type: m.mime_type,
            size_bytes: m.size_bytes,
            status: m.status,
            process_status: m.process_status,
            remarks: m.remarks,
            edit_count: m.edit_count,
            upload_time: m.upload_time,
        }
    }
}

/// Paginated customer listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CustomerPhotoListResponse {
    pub items: Vec<CustomerPhotoItem>,
    pub pagination: Pagination,
}

/// One row of the merchant's received-file listing, decorated with the
/// outcome of the most recent download attempt.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MerchantPhotoItem {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = 9)]
    pub owner_id: i32,
    /// Username of the uploading customer.
    #[schema(example = "alice")]
    pub owner_username: Option<String>,
    #[schema(example = "storefront.jpg")]
    pub original_name: String,
    #[schema(example = "image")]
    pub file_type: String,
    #[schema(example = "image/jpeg")]
    pub mime_type: String,
    #[schema(example = 204800)]
    pub size_bytes: i64,
    /// Lifecycle status, `active` or `deleted`.
    #[schema(example = "active")]
    pub status: String,
    #[schema(example = "received")]
    pub process_status: String,
    pub remarks: Option<String>,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub upload_time: DateTime<Utc>,
    /// `success` or `failed` from the latest attempt, null if never tried.
    #[schema(example = "success")]
    pub download_status: Option<String>,
    pub download_time: Option<DateTime<Utc>>,
}

impl MerchantPhotoItem {
    pub fn from_model(
        m: file_asset::Model,
        owner_username: Option<String>,
        download_status: Option<String>,
        download_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            owner_username,
            original_name: m.original_name,
            file_type: m.file_type,
            mime_type: m.mime_type,
            size_bytes: m.size_bytes,
            status: m.status,
            process_status: m.process_status,
            remarks: m.remarks,
            upload_time: m.upload_time,
            download_status,
            download_time,
        }
    }
}

/// Paginated merchant listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MerchantPhotoListResponse {
    pub items: Vec<MerchantPhotoItem>,
    pub pagination: Pagination,
}

/// One row of the admin file listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AdminPhotoItem {
    #[schema(example = 7)]
    pub id: i32,
    #[schema(example = 9)]
    pub owner_id: i32,
    #[schema(example = "alice")]
    pub owner_username: Option<String>,
    #[schema(example = 3)]
    pub merchant_id: i32,
    #[schema(example = "north_cafe")]
    pub merchant_username: Option<String>,
    #[schema(example = "storefront.jpg")]
    pub original_name: String,
    #[schema(example = "image")]
    pub file_type: String,
    #[schema(example = 204800)]
    pub size_bytes: i64,
    #[schema(example = "active")]
    pub status: String,
    #[schema(example = "received")]
    pub process_status: String,
    #[schema(example = "2025-10-01T14:30:00Z")]
    pub upload_time: DateTime<Utc>,
}

impl AdminPhotoItem {
    pub fn from_model(
        m: file_asset::Model,
        owner_username: Option<String>,
        merchant_username: Option<String>,
    ) -> Self {
        Self {
            id: m.id,
            owner_id: m.owner_id,
            owner_username,
            merchant_id: m.merchant_id,
            merchant_username,
            original_name: m.original_name,
            file_type: m.file_type,
            size_bytes: m.size_bytes,
            status: m.status,
            process_status: m.process_status,
            upload_time: m.upload_time,
        }
    }
}

/// Paginated admin listing.
#[derive(Serialize, utoipa::ToSchema)]
pub struct AdminPhotoListResponse {
    pub items: Vec<AdminPhotoItem>,
    pub pagination: Pagination,
}

/// Request body for editing remarks.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RemarksRequest {
    /// New remark text (at most 500 characters).
    #[schema(example = "Please print the first two only")]
    pub remarks: String,
}

/// Result of an accepted remark edit.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RemarksResponse {
    /// Edits consumed so far.
    #[schema(example = 3)]
    pub edit_count: i32,
    /// Edits left before the lifetime cap.
    #[schema(example = 7)]
    pub remaining_edits: i32,
}

/// Request body for setting a file's process status.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ProcessStatusRequest {
    /// One of `received`, `processing`, `shipped`.
    #[schema(example = "shipped")]
    pub process_status: String,
}

/// Query parameters for the batch-selected download.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct BatchDownloadQuery {
    /// Comma-separated file ids, e.g. `3,1,7`.
    #[param(example = "3,1,7")]
    pub ids: String,
}
