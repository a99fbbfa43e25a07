//! Subcommand implementations.

pub mod finalize;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use platewatch_core::AppConfig;
use platewatch_db::Database;
use std::path::Path;
use tracing::info;

/// Load and validate configuration, applying environment overrides.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load_with_env(path).context("failed to load configuration")
}

/// Open the database named by the configuration, applying migrations.
pub(crate) async fn open_database(config: &AppConfig) -> Result<Database> {
    let path = &config.database.path;
    let db = Database::open(path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?;
    info!(path = %path.display(), "database ready");
    Ok(db)
}
