use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use common::archive::{build_archive, ArchiveEntry};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tokio_util::io::ReaderStream;
use tracing::instrument;
use uuid::Uuid;

use crate::access::Principal;
use crate::audit::{DownloadLedger, DownloadType, FileOutcome, OpCode};
use crate::entity::file_asset;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::DownloadPrincipal;
use crate::extractors::json::ApiJson;
use crate::filters::{
    apply_time_window, default_file_order, process_status_filter, resolve_time_window, PageParams,
};
use crate::lifecycle::{AssetStatus, ProcessStatus};
use crate::models::photo::{
    BatchDownloadQuery, MerchantPhotoItem, MerchantPhotoListQuery, MerchantPhotoListResponse,
    ProcessStatusRequest,
};
use crate::models::shared::{parse_id_list, Pagination};
use crate::state::AppState;
use crate::utils::filename::content_disposition_value;

use super::usernames_for;

#[utoipa::path(
    get,
    path = "/photos",
    tag = "Merchant",
    operation_id = "listReceivedPhotos",
    summary = "List files sent to the caller",
    description = "Paginated listing of every file uploaded to the calling merchant, decorated \
        with the outcome of the most recent download attempt per file. Supports process-status, \
        upload-time and uploading-customer filters.",
    params(MerchantPhotoListQuery),
    responses(
        (status = 200, description = "File listing", body = MerchantPhotoListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(merchant_id = principal.id))]
pub async fn list_received(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<MerchantPhotoListQuery>,
) -> Result<Json<MerchantPhotoListResponse>, AppError> {
    principal.require_merchant()?;

    let page = PageParams::from_query(query.page, query.limit);
    let window = resolve_time_window(
        query.time_filter.as_deref(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        Utc::now(),
    )?;

    // Soft-deleted files stay invisible to the merchant until restored.
    let mut select = file_asset::Entity::find()
        .filter(file_asset::Column::MerchantId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()));
    if let Some(customer_id) = query.customer_id {
        select = select.filter(file_asset::Column::OwnerId.eq(customer_id));
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

    let file_ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let latest = DownloadLedger::new(&state.db)
        .latest_per_file(principal.id, &file_ids)
        .await?;
    let usernames = usernames_for(&state.db, rows.iter().map(|r| r.owner_id)).await?;

    let items = rows
        .into_iter()
        .map(|m| {
            let owner_username = usernames.get(&m.owner_id).cloned();
            let (download_status, download_time) = match latest.get(&m.id) {
                Some(r) => (Some(r.status.clone()), Some(r.download_time)),
                None => (None, None),
            };
            MerchantPhotoItem::from_model(m, owner_username, download_status, download_time)
        })
        .collect();

    Ok(Json(MerchantPhotoListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

#[utoipa::path(
    put,
    path = "/photos/{id}/process-status",
    tag = "Merchant",
    operation_id = "setProcessStatus",
    summary = "Set the process status of a file",
    description = "Moves a file between `received`, `processing` and `shipped`. Transitions are \
        unrestricted in order but only active files can change.",
    params(("id" = i32, Path, description = "File id")),
    responses(
        (status = 204, description = "Process status updated"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "File is deleted (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(merchant_id = principal.id, file_id = id))]
pub async fn set_process_status(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ApiJson(payload): ApiJson<ProcessStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_merchant()?;

    let status: ProcessStatus = payload
        .process_status
        .parse()
        .map_err(AppError::Validation)?;

    let result = file_asset::Entity::update_many()
        .col_expr(
            file_asset::Column::ProcessStatus,
            Expr::value(status.as_str()),
        )
        .filter(file_asset::Column::Id.eq(id))
        .filter(file_asset::Column::MerchantId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        let row = file_asset::Entity::find_by_id(id)
            .filter(file_asset::Column::MerchantId.eq(principal.id))
            .one(&state.db)
            .await?;
        return Err(match row {
            None => AppError::NotFound("File not found".into()),
            Some(_) => {
                AppError::Conflict("Process status cannot be changed on a deleted file".into())
            }
        });
    }

    state.audit.record(
        Some(principal.id),
        OpCode::SetProcessStatus,
        format!("Set process status of file {id} to {status}"),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/photos/{id}/download",
    tag = "Merchant",
    operation_id = "downloadPhoto",
    summary = "Download a single file",
    description = "Streams one active file sent to the calling merchant. Every attempt is \
        recorded in the download ledger, including failed ones.",
    params(
        ("id" = i32, Path, description = "File id"),
        ("token" = Option<String>, Query, description = "JWT, accepted as an alternative to the Authorization header"),
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "File not found or missing from storage (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal), fields(merchant_id = principal.id, file_id = id))]
pub async fn download_photo(
    DownloadPrincipal(principal): DownloadPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    principal.require_merchant()?;

    let asset = file_asset::Entity::find_by_id(id)
        .filter(file_asset::Column::MerchantId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    let ledger = DownloadLedger::new(&state.db);
    match state.files.open_stream(&asset.stored_name).await {
        Ok(reader) => {
            ledger
                .append(
                    principal.id,
                    DownloadType::Single,
                    None,
                    &[FileOutcome::success(asset.id)],
                )
                .await;
            state.audit.record(
                Some(principal.id),
                OpCode::DownloadSingle,
                format!("Downloaded file {} ('{}')", asset.id, asset.original_name),
            );
            stream_asset_response(reader, &asset)
        }
        Err(e) => {
            let message = e.to_string();
            ledger
                .append(
                    principal.id,
                    DownloadType::Single,
                    None,
                    &[FileOutcome::failed(asset.id, message)],
                )
                .await;
            Err(e.into())
        }
    }
}

#[utoipa::path(
    get,
    path = "/customers/{customer_id}/download",
    tag = "Merchant",
    operation_id = "downloadCustomerBatch",
    summary = "Download everything one customer sent",
    description = "Bundles every active file the customer uploaded to the calling merchant into \
        a ZIP archive. Files missing from storage are skipped and recorded as failed attempts; \
        a batch that resolves to one file streams it directly without archiving.",
    params(
        ("customer_id" = i32, Path, description = "Uploading customer id"),
        ("token" = Option<String>, Query, description = "JWT, accepted as an alternative to the Authorization header"),
    ),
    responses(
        (status = 200, description = "ZIP archive or single file content"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Nothing downloadable (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal), fields(merchant_id = principal.id, customer_id))]
pub async fn download_customer_batch(
    DownloadPrincipal(principal): DownloadPrincipal,
    State(state): State<AppState>,
    Path(customer_id): Path<i32>,
) -> Result<Response, AppError> {
    principal.require_merchant()?;

    let assets = file_asset::Entity::find()
        .filter(file_asset::Column::MerchantId.eq(principal.id))
        .filter(file_asset::Column::OwnerId.eq(customer_id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .order_by_asc(file_asset::Column::Id)
        .all(&state.db)
        .await?;

    if assets.is_empty() {
        return Err(AppError::NotFound(
            "No downloadable files for this customer".into(),
        ));
    }

    serve_batch(&state, &principal, assets).await
}

#[utoipa::path(
    get,
    path = "/photos/download",
    tag = "Merchant",
    operation_id = "downloadSelectedPhotos",
    summary = "Download a selected set of files",
    description = "Bundles the listed active files into a ZIP archive. Ids the caller cannot \
        see are silently dropped; files missing from storage are skipped and recorded as failed \
        attempts. A selection that resolves to one file streams it directly.",
    params(
        BatchDownloadQuery,
        ("token" = Option<String>, Query, description = "JWT, accepted as an alternative to the Authorization header"),
    ),
    responses(
        (status = 200, description = "ZIP archive or single file content"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Nothing downloadable (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(merchant_id = principal.id))]
pub async fn download_selected(
    DownloadPrincipal(principal): DownloadPrincipal,
    State(state): State<AppState>,
    Query(query): Query<BatchDownloadQuery>,
) -> Result<Response, AppError> {
    principal.require_merchant()?;

    let ids = parse_id_list(&query.ids)?;
    let assets = file_asset::Entity::find()
        .filter(file_asset::Column::Id.is_in(ids))
        .filter(file_asset::Column::MerchantId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .order_by_asc(file_asset::Column::Id)
        .all(&state.db)
        .await?;

    if assets.is_empty() {
        return Err(AppError::NotFound(
            "No downloadable files among the requested ids".into(),
        ));
    }

    serve_batch(&state, &principal, assets).await
}

/// Serve a resolved batch: one survivor streams directly, more than one is
/// spooled into a ZIP archive. Every targeted file gets a ledger row.
async fn serve_batch(
    state: &AppState,
    principal: &Principal,
    assets: Vec<file_asset::Model>,
) -> Result<Response, AppError> {
    let ledger = DownloadLedger::new(&state.db);

    if let [asset] = assets.as_slice() {
        return match state.files.open_stream(&asset.stored_name).await {
            Ok(reader) => {
                ledger
                    .append(
                        principal.id,
                        DownloadType::Batch,
                        None,
                        &[FileOutcome::success(asset.id)],
                    )
                    .await;
                state.audit.record(
                    Some(principal.id),
                    OpCode::DownloadBatch,
                    format!("Batch download resolved to single file {}", asset.id),
                );
                stream_asset_response(reader, asset)
            }
            Err(e) => {
                let message = e.to_string();
                ledger
                    .append(
                        principal.id,
                        DownloadType::Batch,
                        None,
                        &[FileOutcome::failed(asset.id, message)],
                    )
                    .await;
                Err(e.into())
            }
        };
    }

    let entries: Vec<ArchiveEntry> = assets
        .iter()
        .map(|a| ArchiveEntry {
            id: a.id,
            entry_name: a.original_name.clone(),
            source: state.files.path_of(&a.stored_name),
        })
        .collect();

    let archive_name = format!("batch-{}-{}.zip", principal.id, Uuid::new_v4());
    let dest = state.files.archive_path(&archive_name);

    let build_dest = dest.clone();
    let report = tokio::task::spawn_blocking(move || build_archive(&entries, &build_dest))
        .await
        .map_err(|e| AppError::Internal(format!("Archive task failed: {e}")))?;

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            let outcomes: Vec<FileOutcome> = assets
                .iter()
                .map(|a| FileOutcome::failed(a.id, "Archive build failed"))
                .collect();
            ledger
                .append(principal.id, DownloadType::Batch, None, &outcomes)
                .await;
            return Err(AppError::Internal(format!("Archive build failed: {e}")));
        }
    };

    if report.is_empty() {
        let outcomes: Vec<FileOutcome> = report
            .missing
            .iter()
            .map(|&id| FileOutcome::failed(id, "File is missing from storage"))
            .collect();
        ledger
            .append(principal.id, DownloadType::Batch, None, &outcomes)
            .await;
        return Err(AppError::NotFound(
            "None of the requested files are available".into(),
        ));
    }

    let archive_path = dest.to_string_lossy().into_owned();
    let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(assets.len());
    outcomes.extend(report.included.iter().map(|&id| FileOutcome::success(id)));
    outcomes.extend(
        report
            .missing
            .iter()
            .map(|&id| FileOutcome::failed(id, "File is missing from storage")),
    );
    ledger
        .append(
            principal.id,
            DownloadType::Batch,
            Some(&archive_path),
            &outcomes,
        )
        .await;

    state.audit.record(
        Some(principal.id),
        OpCode::DownloadBatch,
        format!(
            "Batch download: {} files archived, {} missing",
            report.included.len(),
            report.missing.len()
        ),
    );

    let download_name = format!("photos-{}.zip", Utc::now().format("%Y%m%d-%H%M%S"));
    stream_archive_response(&dest, &download_name).await
}

/// Build a streaming response for one stored file.
fn stream_asset_response(
    reader: common::storage::BoxReader,
    asset: &file_asset::Model,
) -> Result<Response, AppError> {
    let stream = ReaderStream::new(reader);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, asset.mime_type.as_str())
        .header(header::CONTENT_LENGTH, asset.size_bytes.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&asset.original_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Build a streaming response for a spooled ZIP archive.
async fn stream_archive_response(
    path: &std::path::Path,
    download_name: &str,
) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open archive: {e}")))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to stat archive: {e}")))?
        .len();

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(download_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
