//! Swaps production once every shard worker has reported in.

use crate::error::Result;
use crate::publisher::{StagingPublisher, SwapOutcome};
use chrono::Utc;
use platewatch_core::{RunStatus, SyncKey};
use platewatch_db::{PlateStore, SyncMetadata};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FinalizerOptions {
    pub shards: Vec<String>,
    /// Give up after this long
    pub wait: Duration,
    pub poll_interval: Duration,
    /// Shard reports older than this, relative to the finalizer's start, are ignored
    pub max_age: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Swapped { rows: u64 },
    /// Every shard finished but staging was empty
    SwapSkipped,
    /// At least one shard reported FAILED, so production was left alone
    ShardsFailed { shards: Vec<String> },
    /// Some shards never reported a fresh terminal status
    TimedOut { pending: Vec<String> },
}

impl FinalizeOutcome {
    /// Status recorded under the global key.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Swapped { .. } => RunStatus::Completed,
            Self::SwapSkipped | Self::ShardsFailed { .. } => RunStatus::Warning,
            Self::TimedOut { .. } => RunStatus::Failed,
        }
    }
}

pub struct Finalizer {
    store: Arc<dyn PlateStore>,
}

impl Finalizer {
    #[must_use]
    pub fn new(store: Arc<dyn PlateStore>) -> Self {
        Self { store }
    }

    /// Wait for the shards, then swap or report why not.
    ///
    /// A store fault after the RUNNING heartbeat is recorded as FAILED under
    /// the global key before it is returned.
    pub async fn finalize(&self, options: &FinalizerOptions) -> Result<FinalizeOutcome> {
        let global = SyncKey::full();

        info!(shards = ?options.shards, "waiting for shard workers");
        self.report(&global, RunStatus::Running, Some(format!("waiting for {} shards", options.shards.len())))
            .await?;

        let outcome = match self.await_shards(options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("finalizer aborted: {e}");
                if let Err(report_err) = self
                    .report(&global, RunStatus::Failed, Some(format!("finalizer aborted: {e}")))
                    .await
                {
                    warn!("failed to update sync metadata: {report_err}");
                }
                return Err(e);
            }
        };

        let message = match &outcome {
            FinalizeOutcome::Swapped { rows } => {
                info!(rows, "all shards finished, production swapped");
                None
            }
            FinalizeOutcome::SwapSkipped => {
                warn!("all shards finished but staging is empty, swap skipped");
                Some("staging empty, production swap skipped".to_string())
            }
            FinalizeOutcome::ShardsFailed { shards } => {
                warn!(shards = ?shards, "shard failure, production swap withheld");
                Some(format!("shards failed: {}", shards.join(",")))
            }
            FinalizeOutcome::TimedOut { pending } => {
                error!(pending = ?pending, "timed out waiting for shards");
                Some(format!("timed out waiting for shards: {}", pending.join(",")))
            }
        };
        self.report(&global, outcome.status(), message).await?;

        Ok(outcome)
    }

    /// Poll shard metadata until every shard is done, one failed, or the wait ran out.
    async fn await_shards(&self, options: &FinalizerOptions) -> Result<FinalizeOutcome> {
        let max_age = chrono::Duration::from_std(options.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let fresh_after = Utc::now() - max_age;
        let deadline = Instant::now() + options.wait;

        loop {
            let mut pending = Vec::new();
            let mut failed = Vec::new();

            for shard in &options.shards {
                let status = self
                    .store
                    .get_sync_metadata(&SyncKey::shard(shard))
                    .await?
                    .filter(|m| m.last_run_at >= fresh_after)
                    .map(|m| m.status);

                match status {
                    Some(RunStatus::Failed) => failed.push(shard.clone()),
                    Some(RunStatus::Completed | RunStatus::Warning) => {}
                    Some(RunStatus::Running) | None => pending.push(shard.clone()),
                }
            }

            if !failed.is_empty() {
                return Ok(FinalizeOutcome::ShardsFailed { shards: failed });
            }
            if pending.is_empty() {
                let publisher = StagingPublisher::new(self.store.as_ref());
                return Ok(match publisher.publish_swap().await? {
                    SwapOutcome::Swapped { rows } => FinalizeOutcome::Swapped { rows },
                    SwapOutcome::Skipped => FinalizeOutcome::SwapSkipped,
                });
            }
            if Instant::now() >= deadline {
                return Ok(FinalizeOutcome::TimedOut { pending });
            }

            debug!(pending = ?pending, "shards still running");
            tokio::time::sleep(options.poll_interval).await;
        }
    }

    async fn report(&self, key: &SyncKey, status: RunStatus, message: Option<String>) -> Result<()> {
        self.store
            .upsert_sync_metadata(&SyncMetadata::now(key.clone(), status, message))
            .await?;
        Ok(())
    }
}
