//! Run-level counters, flushed once per run.

use chrono::{DateTime, Utc};
use platewatch_core::{RunStatus, SyncKey};
use platewatch_db::SyncRunRecord;
use tracing::{error, info, warn};

/// How a station ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationOutcome {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RunStats {
    pub run_id: String,
    pub sync_key: SyncKey,
    pub shard_label: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub plates_found: u64,
    pub stations_total: u64,
    pub stations_success: u64,
    pub stations_failed: u64,
    pub stations_skipped: u64,
    pub captcha_attempts: u64,
    pub captcha_success: u64,
    pub insert_failures: u64,
    pub errors: Vec<String>,
    pub dropped_errors: u64,
    max_errors: usize,
}

impl RunStats {
    #[must_use]
    pub fn new(shard_label: Option<&str>, max_errors: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            sync_key: SyncKey::for_shard(shard_label),
            shard_label: shard_label.map(str::to_string),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            plates_found: 0,
            stations_total: 0,
            stations_success: 0,
            stations_failed: 0,
            stations_skipped: 0,
            captcha_attempts: 0,
            captcha_success: 0,
            insert_failures: 0,
            errors: Vec::new(),
            dropped_errors: 0,
            max_errors,
        }
    }

    /// Keep the message if the list has room, otherwise count it as dropped.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.errors.len() < self.max_errors {
            self.errors.push(message.into());
        } else {
            self.dropped_errors += 1;
        }
    }

    pub fn record_station(&mut self, outcome: StationOutcome) {
        match outcome {
            StationOutcome::Success => self.stations_success += 1,
            StationOutcome::Failed => self.stations_failed += 1,
            StationOutcome::Skipped => self.stations_skipped += 1,
        }
    }

    pub fn record_captcha_attempt(&mut self) {
        self.captcha_attempts += 1;
    }

    pub fn record_captcha_success(&mut self) {
        self.captcha_success += 1;
    }

    pub fn record_insert_failure(&mut self, message: impl Into<String>) {
        self.insert_failures += 1;
        self.record_error(message);
    }

    /// Accepted share of submitted CAPTCHA answers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn captcha_success_rate(&self) -> Option<f64> {
        (self.captcha_attempts > 0)
            .then(|| self.captcha_success as f64 / self.captcha_attempts as f64)
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    pub fn to_record(&self) -> SyncRunRecord {
        SyncRunRecord {
            run_id: self.run_id.clone(),
            sync_key: self.sync_key.clone(),
            shard_label: self.shard_label.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status,
            plates_found: self.plates_found,
            stations_total: self.stations_total,
            stations_success: self.stations_success,
            stations_failed: self.stations_failed,
            stations_skipped: self.stations_skipped,
            captcha_attempts: self.captcha_attempts,
            captcha_success: self.captcha_success,
            insert_failures: self.insert_failures,
            captcha_success_rate: self.captcha_success_rate(),
            errors: self.errors.clone(),
            dropped_errors: self.dropped_errors,
        }
    }

    pub fn log_summary(&self) {
        let elapsed_secs = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_seconds();
        let rate = self
            .captcha_success_rate()
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0));

        macro_rules! summary {
            ($level:ident) => {
                $level!(
                    run_id = %self.run_id,
                    sync_key = %self.sync_key,
                    status = %self.status,
                    plates = self.plates_found,
                    stations_total = self.stations_total,
                    stations_success = self.stations_success,
                    stations_failed = self.stations_failed,
                    stations_skipped = self.stations_skipped,
                    captcha_attempts = self.captcha_attempts,
                    captcha_success = self.captcha_success,
                    captcha_success_rate = %rate,
                    insert_failures = self.insert_failures,
                    errors = self.errors.len() as u64 + self.dropped_errors,
                    elapsed_secs,
                    "sync run finished"
                )
            };
        }

        match self.status {
            RunStatus::Failed => summary!(error),
            RunStatus::Warning => summary!(warn),
            _ => summary!(info),
        }
    }
}
