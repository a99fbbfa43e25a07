//! `platewatch run`: one worker crawl.

use super::{load_config, open_database};
use anyhow::Result;
use platewatch_browser::BrowserEngine;
use platewatch_core::{select_shard, AppConfig, RosterLoader, RunStatus, Station};
use platewatch_crawler::{record_init_failure, CrawlError, StationOrchestrator};
use platewatch_db::Database;
use platewatch_solver::{GeminiVisionSolver, RateLimiter};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Everything a crawl needs beyond the store.
struct Worker {
    stations: Vec<Station>,
    solver: GeminiVisionSolver,
    limiter: RateLimiter,
    browser: BrowserEngine,
}

async fn prepare(config: &AppConfig, shard: Option<&str>) -> Result<Worker, CrawlError> {
    let roster = RosterLoader::new(&config.crawler.stations_file).load()?;
    let stations = select_shard(roster, shard)?;
    info!(stations = stations.len(), shard = shard.unwrap_or("full"), "roster loaded");

    config.require_api_key()?;
    let solver = GeminiVisionSolver::from_config(&config.solver)?;
    let limiter = RateLimiter::from_config(&config.solver);

    let browser = BrowserEngine::launch(
        config.browser.headless,
        config.browser.window_width,
        config.browser.window_height,
    )
    .await?;

    Ok(Worker {
        stations,
        solver,
        limiter,
        browser,
    })
}

pub async fn execute(config_path: Option<&Path>, shard: Option<&str>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let db = open_database(&config).await?;

    let code = crawl(config, &db, shard).await;
    db.close().await;
    Ok(code)
}

async fn crawl(config: AppConfig, db: &Database, shard: Option<&str>) -> ExitCode {
    let worker = match prepare(&config, shard).await {
        Ok(worker) => worker,
        Err(e) => {
            error!("worker initialization failed: {e}");
            record_init_failure(db, shard, config.crawler.max_errors, &e).await;
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = StationOrchestrator::new(
        config,
        Arc::new(worker.browser),
        Arc::new(worker.solver),
        Arc::new(worker.limiter),
        Arc::new(db.clone()),
    );
    let stats = orchestrator.run(&worker.stations, shard).await;

    if stats.status == RunStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
