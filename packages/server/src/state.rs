use std::sync::Arc;

use common::storage::FilesystemAssetStore;
use sea_orm::DatabaseConnection;

use crate::audit::AuditLogger;
use crate::config::AppConfig;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub files: Arc<FilesystemAssetStore>,
    pub audit: AuditLogger,
}
