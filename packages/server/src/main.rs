use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::storage::FilesystemAssetStore;
use tracing::{Level, info};

use server::audit::AuditLogger;
use server::config::AppConfig;
use server::database::init_db;
use server::seed::{ensure_indexes, seed_bootstrap_admin};
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to connect to the database")?;
    seed_bootstrap_admin(&db, &config).await?;
    ensure_indexes(&db).await.context("Failed to create indexes")?;

    let store = FilesystemAssetStore::new(PathBuf::from(&config.storage.upload_dir))
        .await
        .context("Failed to prepare the upload directory")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState {
        db: db.clone(),
        config,
        files: Arc::new(store),
        audit: AuditLogger::new(db),
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
