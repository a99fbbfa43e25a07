//! `platewatch finalize`: swap production once every shard has finished.

use super::{load_config, open_database};
use anyhow::Result;
use platewatch_crawler::{FinalizeOutcome, Finalizer, FinalizerOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(
    config_path: Option<&Path>,
    shards: Vec<String>,
    wait_secs: u64,
    poll_secs: u64,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let db = open_database(&config).await?;

    let options = FinalizerOptions {
        shards,
        wait: Duration::from_secs(wait_secs),
        poll_interval: Duration::from_secs(poll_secs.max(1)),
        max_age: Duration::from_secs(config.crawler.shard_max_age_secs),
    };
    let outcome = Finalizer::new(Arc::new(db.clone())).finalize(&options).await;
    db.close().await;

    Ok(match outcome? {
        FinalizeOutcome::TimedOut { .. } => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
