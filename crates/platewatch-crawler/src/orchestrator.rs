//! Station orchestrator for one worker process.
//!
//! Iterates the selected stations region by region, runs every plate query
//! through navigation, CAPTCHA and pagination, replaces each station's staging
//! partition, and reports progress under the run's sync key. A full run clears
//! staging first and swaps production at the end; a sharded run leaves the
//! swap to the finalizer.

use crate::captcha::CaptchaRetryLoop;
use crate::context::QueryContext;
use crate::error::{CrawlError, Result};
use crate::navigator::{NavOutcome, StationFormNavigator};
use crate::paginator::ResultPaginator;
use crate::publisher::{staging_rows, StagingPublisher, SwapOutcome};
use crate::stats::{RunStats, StationOutcome};
use chrono::Utc;
use platewatch_browser::BrowserActions;
use platewatch_core::{AppConfig, PlateQuery, PlateRecord, RunStatus, Station};
use platewatch_db::{PlateStore, SyncMetadata};
use platewatch_solver::{CaptchaSolver, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// What one plate query produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Collected(Vec<PlateRecord>),
    Skipped,
}

/// How the crawl phase ended, before the terminal status is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrawlEnd {
    Swapped,
    SwapSkipped,
    Sharded,
}

pub struct StationOrchestrator {
    config: AppConfig,
    browser: Arc<dyn BrowserActions>,
    solver: Arc<dyn CaptchaSolver>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn PlateStore>,
}

impl StationOrchestrator {
    #[must_use]
    pub fn new(
        config: AppConfig,
        browser: Arc<dyn BrowserActions>,
        solver: Arc<dyn CaptchaSolver>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn PlateStore>,
    ) -> Self {
        Self {
            config,
            browser,
            solver,
            limiter,
            store,
        }
    }

    /// Crawl `stations` and persist the outcome.
    ///
    /// Never returns an error: a run-fatal fault ends the run as FAILED, and
    /// the stats, sync metadata and browser shutdown happen on every path.
    pub async fn run(&self, stations: &[Station], shard: Option<&str>) -> RunStats {
        let mut stats = RunStats::new(shard, self.config.crawler.max_errors);
        info!(
            run_id = %stats.run_id,
            sync_key = %stats.sync_key,
            stations = stations.len(),
            "sync run started"
        );
        self.heartbeat(&stats, RunStatus::Running, None).await;

        let result = self.crawl(stations, shard.is_none(), &mut stats).await;

        let (status, message) = match result {
            Ok(CrawlEnd::Swapped | CrawlEnd::Sharded) => (RunStatus::Completed, None),
            Ok(CrawlEnd::SwapSkipped) => (
                RunStatus::Warning,
                Some("staging empty, production swap skipped".to_string()),
            ),
            Err(e) => {
                error!("sync run aborted: {e}");
                stats.record_error(format!("run aborted: {e}"));
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        if let Err(e) = self.browser.close().await {
            warn!("failed to close browser session: {e}");
        }

        stats.finish(status);
        self.persist(&stats, message).await;
        stats
    }

    async fn crawl(&self, stations: &[Station], full_run: bool, stats: &mut RunStats) -> Result<CrawlEnd> {
        let publisher = StagingPublisher::new(self.store.as_ref());

        if full_run {
            let cleared = self.store.clear_all_staging().await?;
            info!(cleared, "staging cleared for full run");
        }

        stats.stations_total = stations.len() as u64;
        let regions = group_by_region(stations);
        let mut done = 0usize;

        for (region_index, (region_id, region_stations)) in regions.iter().enumerate() {
            if region_index > 0 {
                sleep_ms(self.config.crawler.region_pause_ms).await;
            }
            info!(region_id = %region_id, stations = region_stations.len(), "crawling region");

            for (station_index, station) in region_stations.iter().enumerate() {
                if station_index > 0 {
                    sleep_ms(self.config.crawler.station_pause_ms).await;
                }

                let span = info_span!(
                    "station",
                    region_id = %station.region_id,
                    station_id = %station.station_id
                );
                self.crawl_station(station, &publisher, stats)
                    .instrument(span)
                    .await?;

                done += 1;
                self.heartbeat(
                    stats,
                    RunStatus::Running,
                    Some(format!("{done}/{} stations", stations.len())),
                )
                .await;
            }
        }

        if !full_run {
            info!("sharded run, production swap left to the finalizer");
            return Ok(CrawlEnd::Sharded);
        }

        match publisher.publish_swap().await? {
            SwapOutcome::Swapped { .. } => Ok(CrawlEnd::Swapped),
            SwapOutcome::Skipped => Ok(CrawlEnd::SwapSkipped),
        }
    }

    /// Run every query of one station, then replace its partition with what was collected.
    ///
    /// Only run-fatal errors propagate.
    async fn crawl_station(
        &self,
        station: &Station,
        publisher: &StagingPublisher<'_>,
        stats: &mut RunStats,
    ) -> Result<()> {
        info!(station = %station, risk_tier = ?station.risk_tier, "crawling station");

        let mut rows = Vec::new();
        let mut failed = false;
        let mut collected_any = false;

        for query in station.plate_queries() {
            let span = info_span!("query", plate_type = %query.plate_type);
            match self
                .run_query(station, query.clone(), stats)
                .instrument(span)
                .await
            {
                Ok(QueryOutcome::Collected(records)) => {
                    info!(query = %query, plates = records.len(), "query collected");
                    collected_any = true;
                    rows.extend(staging_rows(&query, records, Utc::now()));
                }
                Ok(QueryOutcome::Skipped) => {}
                Err(e) if e.is_run_fatal() => return Err(e),
                Err(e) if e.is_station_fatal() => {
                    error!(query = %query, "station abandoned: {e}");
                    stats.record_error(format!("{query}: {e}"));
                    failed = true;
                    break;
                }
                Err(e) => {
                    warn!(query = %query, "query failed: {e}");
                    stats.record_error(format!("{query}: {e}"));
                    failed = true;
                }
            }
        }

        let outcome = if failed {
            StationOutcome::Failed
        } else if collected_any {
            StationOutcome::Success
        } else {
            StationOutcome::Skipped
        };

        // Replaced even on failure so stale availability is never republished
        match publisher.publish_partition(&station.partition(), &rows).await {
            Ok(inserted) => stats.plates_found += inserted,
            Err(e) => {
                error!(station = %station, "failed to write staging partition: {e}");
                stats.record_insert_failure(format!("{}: {e}", station.partition()));
            }
        }

        stats.record_station(outcome);
        info!(station = %station, outcome = ?outcome, "station finished");
        Ok(())
    }

    async fn run_query(
        &self,
        station: &Station,
        query: PlateQuery,
        stats: &mut RunStats,
    ) -> Result<QueryOutcome> {
        let browser = self.browser.as_ref();
        let portal = &self.config.portal;
        let crawler = &self.config.crawler;
        let mut ctx = QueryContext::new(station, query, crawler);

        let navigator = StationFormNavigator::new(browser, portal, crawler);
        if navigator.prepare(&mut ctx).await? == NavOutcome::Skipped {
            return Ok(QueryOutcome::Skipped);
        }

        CaptchaRetryLoop::new(
            browser,
            self.solver.as_ref(),
            self.limiter.as_ref(),
            portal,
            crawler,
            &self.config.solver,
        )
        .run(&mut ctx, stats)
        .await?;

        let records = ResultPaginator::new(browser, portal, crawler)
            .collect(&mut ctx)
            .await?;
        Ok(QueryOutcome::Collected(records))
    }

    async fn heartbeat(&self, stats: &RunStats, status: RunStatus, message: Option<String>) {
        let metadata = SyncMetadata::now(stats.sync_key.clone(), status, message);
        if let Err(e) = self.store.upsert_sync_metadata(&metadata).await {
            warn!(sync_key = %stats.sync_key, "failed to update sync metadata: {e}");
        }
    }

    async fn persist(&self, stats: &RunStats, message: Option<String>) {
        if let Err(e) = self.store.record_run(&stats.to_record()).await {
            error!(run_id = %stats.run_id, "failed to store run stats: {e}");
        }
        self.heartbeat(stats, stats.status, message).await;
        stats.log_summary();
    }
}

/// Record a run that could not start, e.g. because the roster failed to load.
pub async fn record_init_failure(
    store: &dyn PlateStore,
    shard: Option<&str>,
    max_errors: usize,
    error: &CrawlError,
) -> RunStats {
    let mut stats = RunStats::new(shard, max_errors);
    stats.record_error(format!("initialization failed: {error}"));
    stats.finish(RunStatus::Failed);

    if let Err(e) = store.record_run(&stats.to_record()).await {
        error!(run_id = %stats.run_id, "failed to store run stats: {e}");
    }
    let metadata = SyncMetadata::now(
        stats.sync_key.clone(),
        RunStatus::Failed,
        Some(error.to_string()),
    );
    if let Err(e) = store.upsert_sync_metadata(&metadata).await {
        warn!(sync_key = %stats.sync_key, "failed to update sync metadata: {e}");
    }
    stats.log_summary();
    stats
}

/// Stations grouped by region, both in first-appearance order.
fn group_by_region(stations: &[Station]) -> Vec<(&str, Vec<&Station>)> {
    let mut regions: Vec<(&str, Vec<&Station>)> = Vec::new();
    for station in stations {
        match regions.iter_mut().find(|(id, _)| *id == station.region_id) {
            Some((_, members)) => members.push(station),
            None => regions.push((station.region_id.as_str(), vec![station])),
        }
    }
    regions
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
