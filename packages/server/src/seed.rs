use anyhow::{Context, anyhow};
use chrono::Utc;
use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, OnConflict, PostgresQueryBuilder,
    SqliteQueryBuilder,
};
use sea_orm::*;
use tracing::info;

use crate::access::{AccountStatus, BOOTSTRAP_ADMIN_ID, Role};
use crate::config::AppConfig;
use crate::entity::{download_record, file_asset, operation_log, user};
use crate::utils::hash::hash_password;

/// Seed the primary administrator account on startup.
///
/// The account is created once with a fixed id; later runs leave the row
/// untouched, including any password change made through the API.
pub async fn seed_bootstrap_admin(db: &DatabaseConnection, config: &AppConfig) -> anyhow::Result<()> {
    let password = hash_password(&config.auth.bootstrap_password)
        .map_err(|e| anyhow!("failed to hash bootstrap password: {e}"))?;

    let model = user::ActiveModel {
        id: Set(BOOTSTRAP_ADMIN_ID),
        username: Set("admin".to_string()),
        password: Set(password),
        role: Set(Role::Admin.as_str().to_string()),
        status: Set(AccountStatus::Active.as_str().to_string()),
        disable_reason: Set(None),
        last_login: Set(None),
        created_at: Set(Utc::now()),
    };

    let result = user::Entity::insert(model)
        .on_conflict(
            OnConflict::column(user::Column::Id)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    match result {
        Ok(_) => {
            info!("Seeded bootstrap admin account");
            Ok(())
        }
        Err(DbErr::RecordNotInserted) => Ok(()),
        Err(e) => Err(e).context("failed to seed bootstrap admin"),
    }
}

fn index_sql(stmt: &IndexCreateStatement, backend: DbBackend) -> String {
    match backend {
        DbBackend::MySql => stmt.to_string(MysqlQueryBuilder),
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DbBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        // `DatabaseBackend` is #[non_exhaustive]; every current variant is
        // handled above.
        _ => unreachable!("unsupported database backend"),
    }
}

/// Create indexes that schema-sync does not cover.
///
/// SeaORM's schema-sync doesn't support composite indexes, so we create
/// them manually on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // Backs duplicate detection: one original name per (owner, merchant)
    // pair across both lifecycle states. Failure here is fatal.
    let stmt = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_file_asset_owner_merchant_name")
        .table(file_asset::Entity)
        .col(file_asset::Column::OwnerId)
        .col(file_asset::Column::MerchantId)
        .col(file_asset::Column::OriginalName)
        .to_owned();
    db.execute_unprepared(&index_sql(&stmt, backend)).await?;
    info!("Ensured index idx_file_asset_owner_merchant_name exists");

    // Composite index for the downloaded-flag lookup:
    // SELECT DISTINCT file_id FROM download_record
    //   WHERE merchant_id = ? AND file_id IN (...) AND status = 'success'
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_download_record_merchant_file")
        .table(download_record::Entity)
        .col(download_record::Column::MerchantId)
        .col(download_record::Column::FileId)
        .to_owned();
    match db.execute_unprepared(&index_sql(&stmt, backend)).await {
        Ok(_) => {
            info!("Ensured index idx_download_record_merchant_file exists");
        }
        Err(e) => {
            tracing::warn!("Failed to create index idx_download_record_merchant_file: {}", e);
        }
    }

    // Operation log is listed newest-first.
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_operation_log_created")
        .table(operation_log::Entity)
        .col(operation_log::Column::CreatedAt)
        .to_owned();
    match db.execute_unprepared(&index_sql(&stmt, backend)).await {
        Ok(_) => {
            info!("Ensured index idx_operation_log_created exists");
        }
        Err(e) => {
            tracing::warn!("Failed to create index idx_operation_log_created: {}", e);
        }
    }

    Ok(())
}
