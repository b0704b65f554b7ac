use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_asset")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Customer who uploaded the file.
    pub owner_id: i32,
    /// Merchant the file was uploaded to.
    pub merchant_id: i32,

    /// Client-side file name, unique per (owner, merchant) pair.
    pub original_name: String,
    /// On-disk name, unique across the whole store.
    #[sea_orm(unique)]
    pub stored_name: String,
    /// Location the file was committed to at ingestion.
    pub stored_path: String,

    /// One of: image, archive
    pub file_type: String,
    pub mime_type: String,
    pub size_bytes: i64,

    /// One of: active, deleted
    pub status: String,
    /// One of: received, processing, shipped
    pub process_status: String,

    pub remarks: Option<String>,
    /// Lifetime count of remark edits. Capped, never reset.
    pub edit_count: i32,
    pub last_edit_time: Option<DateTimeUtc>,

    pub upload_time: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
