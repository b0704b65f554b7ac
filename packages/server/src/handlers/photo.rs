use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use common::storage::{generate_stored_name, BoxReader, StagedAsset};
use common::FileKind;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::*;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

use crate::access::{AccountStatus, Principal, Role};
use crate::audit::OpCode;
use crate::entity::{file_asset, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::ApiJson;
use crate::filters::{
    apply_time_window, default_file_order, process_status_filter, resolve_time_window, PageParams,
};
use crate::lifecycle::{self, AssetStatus, IncomingFile, ProcessStatus, MAX_REMARK_EDITS};
use crate::models::photo::{
    validate_duplicate_check, CustomerPhotoItem, CustomerPhotoListResponse, DuplicateCheckRequest,
    DuplicateCheckResponse, PhotoListQuery, RemarksRequest, RemarksResponse, UploadResponse,
    UploadedFile,
};
use crate::models::shared::Pagination;
use crate::state::AppState;
use crate::utils::filename::validate_upload_filename;

use super::usernames_for;

pub fn upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(512 * 1024 * 1024) // 512 MB
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Photos",
    operation_id = "uploadPhotos",
    summary = "Upload a batch of files to a merchant",
    description = "Multipart upload. Repeated `files` fields carry the content (at most 20 per \
        batch), `merchant_id` selects the receiving merchant and an optional `remarks` field is \
        attached to every stored file. Image files may total at most 50 MB per batch; archives \
        are exempt from the size cap. The batch is stored or rejected as a whole.",
    request_body(content_type = "multipart/form-data", description = "Files plus merchant_id and optional remarks"),
    responses(
        (status = 201, description = "Batch stored", body = UploadResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "A file name is already taken for this merchant (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, multipart), fields(user_id = principal.id))]
pub async fn upload_photos(
    principal: Principal,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    principal.require_customer()?;

    let mut staged: Vec<StagedAsset> = Vec::new();
    let mut files: Vec<IncomingFile> = Vec::new();

    let parsed = read_upload_form(&state, &mut multipart, &mut staged, &mut files).await;
    let result = match parsed {
        Ok(form) => store_batch(&state, &principal, &form, &mut staged, &files).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            for asset in staged.drain(..) {
                state.files.discard(asset).await;
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/duplicate-check",
    tag = "Photos",
    operation_id = "duplicateCheck",
    summary = "Pre-flight duplicate name check",
    description = "Returns which of the candidate file names are already taken for the \
        (caller, merchant) pair. Deleted files still hold their names.",
    responses(
        (status = 200, description = "Names already in use", body = DuplicateCheckResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(user_id = principal.id))]
pub async fn duplicate_check(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<DuplicateCheckRequest>,
) -> Result<Json<DuplicateCheckResponse>, AppError> {
    principal.require_customer()?;
    validate_duplicate_check(&payload)?;

    let duplicate_files = find_duplicate_names(
        &state.db,
        principal.id,
        payload.merchant_id,
        &payload.file_names,
    )
    .await?;

    Ok(Json(DuplicateCheckResponse { duplicate_files }))
}

#[utoipa::path(
    get,
    path = "/mine",
    tag = "Photos",
    operation_id = "listMyPhotos",
    summary = "List the caller's uploaded files",
    description = "Paginated listing of the caller's own files, active rows first and newest \
        uploads on top. Supports process-status and upload-time filters.",
    params(PhotoListQuery),
    responses(
        (status = 200, description = "File listing", body = CustomerPhotoListResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, query), fields(user_id = principal.id))]
pub async fn list_my_photos(
    principal: Principal,
    State(state): State<AppState>,
    Query(query): Query<PhotoListQuery>,
) -> Result<Json<CustomerPhotoListResponse>, AppError> {
    principal.require_customer()?;

    let page = PageParams::from_query(query.page, query.limit);
    let window = resolve_time_window(
        query.time_filter.as_deref(),
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        Utc::now(),
    )?;

    let mut select = file_asset::Entity::find();
    if let Some(visibility) = principal.asset_visibility()? {
        select = select.filter(visibility);
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

    let usernames = usernames_for(&state.db, rows.iter().map(|r| r.merchant_id)).await?;
    let items = rows
        .into_iter()
        .map(|m| {
            let merchant_username = usernames.get(&m.merchant_id).cloned();
            CustomerPhotoItem::from_model(m, merchant_username)
        })
        .collect();

    Ok(Json(CustomerPhotoListResponse {
        items,
        pagination: Pagination::new(page, total),
    }))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Photos",
    operation_id = "deletePhoto",
    summary = "Soft-delete a file",
    description = "Marks the file deleted. The row and the stored bytes are kept so the file \
        can be restored later. Deleting an already-deleted file is a conflict.",
    params(("id" = i32, Path, description = "File id")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "File is already deleted (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal), fields(user_id = principal.id, file_id = id))]
pub async fn delete_photo(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_customer()?;

    let result = file_asset::Entity::update_many()
        .col_expr(
            file_asset::Column::Status,
            Expr::value(AssetStatus::Deleted.as_str()),
        )
        .col_expr(file_asset::Column::DeletedAt, Expr::value(Some(Utc::now())))
        .filter(file_asset::Column::Id.eq(id))
        .filter(file_asset::Column::OwnerId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(explain_lifecycle_failure(&state.db, principal.id, id, AssetStatus::Deleted).await);
    }

    state.audit.record(
        Some(principal.id),
        OpCode::SoftDelete,
        format!("Soft-deleted file {id}"),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/restore",
    tag = "Photos",
    operation_id = "restorePhoto",
    summary = "Restore a soft-deleted file",
    description = "Returns a deleted file to the active state. Restoring a file that is \
        already active is a conflict.",
    params(("id" = i32, Path, description = "File id")),
    responses(
        (status = 204, description = "File restored"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "File is already active (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal), fields(user_id = principal.id, file_id = id))]
pub async fn restore_photo(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    principal.require_customer()?;

    let result = file_asset::Entity::update_many()
        .col_expr(
            file_asset::Column::Status,
            Expr::value(AssetStatus::Active.as_str()),
        )
        .col_expr(
            file_asset::Column::DeletedAt,
            Expr::value(None::<DateTime<Utc>>),
        )
        .filter(file_asset::Column::Id.eq(id))
        .filter(file_asset::Column::OwnerId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Deleted.as_str()))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        return Err(explain_lifecycle_failure(&state.db, principal.id, id, AssetStatus::Active).await);
    }

    state.audit.record(
        Some(principal.id),
        OpCode::Restore,
        format!("Restored file {id}"),
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}/remarks",
    tag = "Photos",
    operation_id = "editRemarks",
    summary = "Edit the remarks on a file",
    description = "Replaces the remark text on an active file. Each file accepts at most 10 \
        remark edits over its lifetime; the text is capped at 500 characters.",
    params(("id" = i32, Path, description = "File id")),
    responses(
        (status = 200, description = "Remarks updated", body = RemarksResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "File deleted or edit limit reached (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, principal, payload), fields(user_id = principal.id, file_id = id))]
pub async fn edit_remarks(
    principal: Principal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ApiJson(payload): ApiJson<RemarksRequest>,
) -> Result<Json<RemarksResponse>, AppError> {
    principal.require_customer()?;
    lifecycle::validate_remarks(&payload.remarks)?;

    // One conditional update so concurrent edits cannot blow past the cap.
    let result = file_asset::Entity::update_many()
        .col_expr(file_asset::Column::Remarks, Expr::value(Some(payload.remarks)))
        .col_expr(
            file_asset::Column::EditCount,
            Expr::col(file_asset::Column::EditCount).add(1),
        )
        .col_expr(file_asset::Column::LastEditTime, Expr::value(Some(Utc::now())))
        .filter(file_asset::Column::Id.eq(id))
        .filter(file_asset::Column::OwnerId.eq(principal.id))
        .filter(file_asset::Column::Status.eq(AssetStatus::Active.as_str()))
        .filter(file_asset::Column::EditCount.lt(MAX_REMARK_EDITS))
        .exec(&state.db)
        .await?;

    if result.rows_affected == 0 {
        let row = file_asset::Entity::find_by_id(id)
            .filter(file_asset::Column::OwnerId.eq(principal.id))
            .one(&state.db)
            .await?;
        return Err(match row {
            None => AppError::NotFound("File not found".into()),
            Some(r) if r.status == AssetStatus::Deleted.as_str() => {
                AppError::Conflict("Remarks cannot be edited on a deleted file".into())
            }
            Some(_) => AppError::Conflict(format!(
                "Remark edit limit of {MAX_REMARK_EDITS} reached"
            )),
        });
    }

    let row = file_asset::Entity::find_by_id(id)
        .filter(file_asset::Column::OwnerId.eq(principal.id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Internal("File row missing after remark edit".into()))?;

    state.audit.record(
        Some(principal.id),
        OpCode::EditRemarks,
        format!("Edited remarks on file {id} (edit {} of {MAX_REMARK_EDITS})", row.edit_count),
    );

    Ok(Json(RemarksResponse {
        edit_count: row.edit_count,
        remaining_edits: MAX_REMARK_EDITS - row.edit_count,
    }))
}

struct UploadForm {
    merchant_id: i32,
    remarks: Option<String>,
}

/// Drain the multipart stream, staging every `files` field in the store.
/// Staged assets are pushed into `staged` even on failure so the caller
/// can discard them.
async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &mut Vec<StagedAsset>,
    files: &mut Vec<IncomingFile>,
) -> Result<UploadForm, AppError> {
    let mut merchant_id: Option<i32> = None;
    let mut remarks: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("files") => {
                let file_name = field
                    .file_name()
                    .ok_or_else(|| AppError::Validation("File field must have a filename".into()))?;
                let original_name = validate_upload_filename(file_name)
                    .map_err(|e| AppError::Validation(e.message().into()))?
                    .to_string();

                let mime_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .or_else(|| {
                        mime_guess::from_path(&original_name)
                            .first()
                            .map(|m| m.to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let kind = FileKind::classify(&original_name, &mime_type).ok_or_else(|| {
                    AppError::Validation(format!(
                        "File '{original_name}' is not an accepted image or archive type"
                    ))
                })?;

                let asset = stage_field(state, field).await?;
                let size_bytes = asset.size;
                staged.push(asset);
                files.push(IncomingFile {
                    original_name,
                    mime_type,
                    kind,
                    size_bytes,
                });
            }
            Some("merchant_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read merchant_id: {e}")))?;
                let id = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::Validation("merchant_id must be an integer".into()))?;
                merchant_id = Some(id);
            }
            Some("remarks") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read remarks: {e}")))?;
                if !text.trim().is_empty() {
                    remarks = Some(text);
                }
            }
            _ => {} // Ignore unknown fields.
        }
    }

    let merchant_id =
        merchant_id.ok_or_else(|| AppError::Validation("Missing 'merchant_id' field".into()))?;

    Ok(UploadForm {
        merchant_id,
        remarks,
    })
}

/// Validate the parsed batch and persist it: rows and bytes commit together
/// or not at all. Drains `staged` once the files are committed.
async fn store_batch(
    state: &AppState,
    principal: &Principal,
    form: &UploadForm,
    staged: &mut Vec<StagedAsset>,
    files: &[IncomingFile],
) -> Result<UploadResponse, AppError> {
    lifecycle::validate_batch(files)?;
    if let Some(remarks) = &form.remarks {
        lifecycle::validate_remarks(remarks)?;
    }
    find_active_merchant(&state.db, form.merchant_id).await?;

    let txn = state.db.begin().await?;

    let names: Vec<String> = files.iter().map(|f| f.original_name.clone()).collect();
    let duplicates = find_duplicate_names(&txn, principal.id, form.merchant_id, &names).await?;
    if !duplicates.is_empty() {
        return Err(AppError::Conflict(format!(
            "File names already uploaded to this merchant: {}",
            duplicates.join(", ")
        )));
    }

    let now = Utc::now();
    let mut stored_names: Vec<String> = Vec::with_capacity(files.len());
    let mut manifest: Vec<UploadedFile> = Vec::with_capacity(files.len());

    for file in files {
        let stored_name = generate_stored_name(&file.original_name);
        let stored_path = state.files.path_of(&stored_name).to_string_lossy().into_owned();

        let row = file_asset::ActiveModel {
            owner_id: Set(principal.id),
            merchant_id: Set(form.merchant_id),
            original_name: Set(file.original_name.clone()),
            stored_name: Set(stored_name.clone()),
            stored_path: Set(stored_path),
            file_type: Set(file.kind.as_str().to_string()),
            mime_type: Set(file.mime_type.clone()),
            size_bytes: Set(i64::try_from(file.size_bytes).unwrap_or(i64::MAX)),
            status: Set(AssetStatus::Active.as_str().to_string()),
            process_status: Set(ProcessStatus::Received.as_str().to_string()),
            remarks: Set(form.remarks.clone()),
            edit_count: Set(0),
            last_edit_time: Set(None),
            upload_time: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        };

        let model = row.insert(&txn).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                tracing::debug!("Upload race: unique constraint caught on insert");
                AppError::Conflict(format!(
                    "File '{}' was uploaded concurrently",
                    file.original_name
                ))
            }
            _ => AppError::from(e),
        })?;

        stored_names.push(stored_name);
        manifest.push(UploadedFile {
            id: model.id,
            original_name: model.original_name,
            file_type: model.file_type,
            size_bytes: model.size_bytes,
        });
    }

    // Rows are written; move the staged bytes to their final names before
    // the transaction commits. Any failure rolls both sides back.
    let mut assets = std::mem::take(staged).into_iter();
    let mut committed: Vec<&str> = Vec::with_capacity(stored_names.len());
    let mut failure: Option<AppError> = None;

    for stored_name in &stored_names {
        let Some(asset) = assets.next() else { break };
        match state.files.commit(asset, stored_name).await {
            Ok(_) => committed.push(stored_name),
            Err(e) => {
                failure = Some(e.into());
                break;
            }
        }
    }

    if let Some(e) = failure {
        for asset in assets {
            state.files.discard(asset).await;
        }
        remove_files(state, &committed).await;
        return Err(e);
    }

    if let Err(e) = txn.commit().await {
        remove_files(state, &committed).await;
        return Err(e.into());
    }

    state.audit.record(
        Some(principal.id),
        OpCode::Upload,
        format!(
            "Uploaded {} files to merchant {}",
            manifest.len(),
            form.merchant_id
        ),
    );

    Ok(UploadResponse { files: manifest })
}

/// Stream a multipart field into the store's staging area via a temp file.
async fn stage_field(
    state: &AppState,
    mut field: axum::extract::multipart::Field<'_>,
) -> Result<StagedAsset, AppError> {
    let temp_path = std::env::temp_dir().join(format!("photodrop-upload-{}", Uuid::new_v4()));

    let result = async {
        let mut temp_file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("Upload read error: {e}")))?
        {
            temp_file
                .write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
        }

        temp_file
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
        drop(temp_file);

        let file = tokio::fs::File::open(&temp_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        let reader: BoxReader = Box::new(file);
        Ok(state.files.stage(reader).await?)
    }
    .await;

    // Best effort.
    let _ = tokio::fs::remove_file(&temp_path).await;

    result
}

/// The merchant an upload targets must exist, hold the merchant role and
/// not be disabled.
async fn find_active_merchant<C: ConnectionTrait>(db: &C, id: i32) -> Result<(), AppError> {
    let account = user::Entity::find_by_id(id)
        .one(db)
        .await?
        .filter(|account| account.role == Role::Merchant.as_str())
        .ok_or_else(|| AppError::Validation("Selected merchant does not exist".into()))?;

    if account.status == AccountStatus::Disabled.as_str() {
        return Err(AppError::Validation("Selected merchant is disabled".into()));
    }
    Ok(())
}

/// Which of `names` already exist for the `(owner, merchant)` pair.
/// Rows of either lifecycle status count.
async fn find_duplicate_names<C: ConnectionTrait>(
    db: &C,
    owner_id: i32,
    merchant_id: i32,
    names: &[String],
) -> Result<Vec<String>, AppError> {
    let existing: Vec<String> = file_asset::Entity::find()
        .select_only()
        .column(file_asset::Column::OriginalName)
        .filter(file_asset::Column::OwnerId.eq(owner_id))
        .filter(file_asset::Column::MerchantId.eq(merchant_id))
        .filter(file_asset::Column::OriginalName.is_in(names.iter().map(String::as_str)))
        .into_tuple()
        .all(db)
        .await?;
    Ok(existing)
}

/// Decide why a conditional lifecycle update matched nothing.
async fn explain_lifecycle_failure<C: ConnectionTrait>(
    db: &C,
    owner_id: i32,
    file_id: i32,
    wanted: AssetStatus,
) -> AppError {
    let row = file_asset::Entity::find_by_id(file_id)
        .filter(file_asset::Column::OwnerId.eq(owner_id))
        .one(db)
        .await;

    match row {
        Ok(None) => AppError::NotFound("File not found".into()),
        Ok(Some(_)) => match wanted {
            AssetStatus::Deleted => AppError::Conflict("File is already deleted".into()),
            AssetStatus::Active => AppError::Conflict("File is already active".into()),
        },
        Err(e) => e.into(),
    }
}

/// Best-effort removal of committed files after an aborted upload.
async fn remove_files(state: &AppState, stored_names: &[&str]) {
    for stored_name in stored_names {
        if let Err(e) = state.files.remove(stored_name).await {
            tracing::warn!("Failed to clean up '{stored_name}' after aborted upload: {e}");
        }
    }
}
