//! `platewatch status`: current sync status and the latest run summary.

use super::{load_config, open_database};
use anyhow::Result;
use platewatch_core::SyncKey;
use platewatch_db::PlateStore;
use std::path::Path;
use std::process::ExitCode;

pub async fn execute(config_path: Option<&Path>, shard: Option<&str>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let db = open_database(&config).await?;
    let key = SyncKey::for_shard(shard);

    match db.get_sync_metadata(&key).await? {
        Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
        None => println!("no status recorded for {key}"),
    }
    match db.latest_run(&key).await? {
        Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
        None => println!("no runs recorded for {key}"),
    }

    db.close().await;
    Ok(ExitCode::SUCCESS)
}
