use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only ledger of merchant download attempts, one row per file.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "download_record")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub file_id: i32,
    pub merchant_id: i32,

    /// One of: single, batch
    pub download_type: String,
    /// One of: success, failed
    pub status: String,

    /// Archive file on disk for batch downloads, NULL for single ones.
    pub archive_path: Option<String>,
    /// Failure detail for failed attempts.
    pub error_message: Option<String>,

    pub download_time: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
