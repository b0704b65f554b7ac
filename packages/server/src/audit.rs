use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use sea_orm::*;
use tracing::warn;

use crate::entity::{download_record, operation_log};

/// Operation codes recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Login,
    LoginFailed,
    Upload,
    SoftDelete,
    Restore,
    EditRemarks,
    SetProcessStatus,
    DownloadSingle,
    DownloadBatch,
    CreateUser,
    SetUserStatus,
    ResetPassword,
}

impl OpCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Upload => "UPLOAD",
            Self::SoftDelete => "SOFT_DELETE",
            Self::Restore => "RESTORE",
            Self::EditRemarks => "EDIT_REMARKS",
            Self::SetProcessStatus => "SET_PROCESS_STATUS",
            Self::DownloadSingle => "DOWNLOAD_SINGLE",
            Self::DownloadBatch => "DOWNLOAD_BATCH",
            Self::CreateUser => "CREATE_USER",
            Self::SetUserStatus => "SET_USER_STATUS",
            Self::ResetPassword => "RESET_PASSWORD",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of a download attempt recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadType {
    Single,
    Batch,
}

impl DownloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

/// Per-file outcome of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One ledger entry in the making.
#[derive(Debug)]
pub struct FileOutcome {
    pub file_id: i32,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
}

impl FileOutcome {
    pub fn success(file_id: i32) -> Self {
        Self {
            file_id,
            status: DownloadStatus::Success,
            error_message: None,
        }
    }

    pub fn failed(file_id: i32, message: impl Into<String>) -> Self {
        Self {
            file_id,
            status: DownloadStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}

/// Fire-and-forget writer for the operation log.
///
/// Log writes never fail the request they describe; failures are traced
/// and dropped.
#[derive(Clone)]
pub struct AuditLogger {
    db: DatabaseConnection,
}

impl AuditLogger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record one operation. `user_id` is `None` when the acting identity
    /// was never resolved, e.g. a login attempt for an unknown username.
    pub fn record(&self, user_id: Option<i32>, op: OpCode, details: impl Into<String>) {
        let db = self.db.clone();
        let details = details.into();
        tokio::spawn(async move {
            let entry = operation_log::ActiveModel {
                user_id: Set(user_id),
                op_code: Set(op.as_str().to_string()),
                details: Set(details),
                created_at: Set(Utc::now()),
                ..Default::default()
            };
            if let Err(e) = operation_log::Entity::insert(entry).exec(&db).await {
                warn!("Failed to write operation log entry {op}: {e}");
            }
        });
    }
}

/// Append-only ledger of merchant download attempts.
///
/// Rows are written after the download outcome is known and must never
/// turn a served download into an error, so append failures are traced
/// and dropped.
pub struct DownloadLedger<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> DownloadLedger<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Append one row per file of a download attempt.
    pub async fn append(
        &self,
        merchant_id: i32,
        kind: DownloadType,
        archive_path: Option<&str>,
        outcomes: &[FileOutcome],
    ) {
        for outcome in outcomes {
            // A failed file never made it into the archive, so its row
            // carries the error message instead of the archive path.
            let archive_path = match outcome.status {
                DownloadStatus::Success => archive_path.map(str::to_string),
                DownloadStatus::Failed => None,
            };
            let row = download_record::ActiveModel {
                file_id: Set(outcome.file_id),
                merchant_id: Set(merchant_id),
                download_type: Set(kind.as_str().to_string()),
                status: Set(outcome.status.as_str().to_string()),
                archive_path: Set(archive_path),
                error_message: Set(outcome.error_message.clone()),
                download_time: Set(Utc::now()),
                ..Default::default()
            };
            if let Err(e) = download_record::Entity::insert(row).exec(self.db).await {
                warn!(
                    "Failed to append download record for file {}: {e}",
                    outcome.file_id
                );
            }
        }
    }

    /// Most recent ledger row per file for one merchant.
    ///
    /// The ledger is append-only, so "current" download state is computed
    /// here on the read path rather than stored.
    pub async fn latest_per_file(
        &self,
        merchant_id: i32,
        file_ids: &[i32],
    ) -> Result<HashMap<i32, download_record::Model>, DbErr> {
        if file_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = download_record::Entity::find()
            .filter(download_record::Column::MerchantId.eq(merchant_id))
            .filter(download_record::Column::FileId.is_in(file_ids.iter().copied()))
            .order_by_desc(download_record::Column::DownloadTime)
            .order_by_desc(download_record::Column::Id)
            .all(self.db)
            .await?;

        let mut latest = HashMap::new();
        for row in rows {
            latest.entry(row.file_id).or_insert(row);
        }
        Ok(latest)
    }
}
