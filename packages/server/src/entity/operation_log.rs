use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only record of state-changing operations.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operation_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// NULL when the operation failed before identity was resolved,
    /// e.g. a login attempt for an unknown username.
    pub user_id: Option<i32>,

    pub op_code: String,
    pub details: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
