//! Per-run summaries.

use crate::error::{DatabaseError, Result};
use crate::staging::{parse_timestamp, to_i64};
use chrono::{DateTime, Utc};
use platewatch_core::{RunStatus, SyncKey};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Stored summary of one orchestrator or finalizer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    /// Unique run identifier
    pub run_id: String,
    /// Key the run reported under
    pub sync_key: SyncKey,
    /// Shard the run was restricted to
    pub shard_label: Option<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: Option<DateTime<Utc>>,
    /// Final status
    pub status: RunStatus,
    /// Plates staged
    pub plates_found: u64,
    /// Stations attempted
    pub stations_total: u64,
    /// Stations whose queries all succeeded or were skipped
    pub stations_success: u64,
    /// Stations with at least one failed query
    pub stations_failed: u64,
    /// Stations whose every query was skipped
    pub stations_skipped: u64,
    /// CAPTCHA answers submitted
    pub captcha_attempts: u64,
    /// CAPTCHA answers accepted
    pub captcha_success: u64,
    /// Partition writes that failed
    pub insert_failures: u64,
    /// `captcha_success / captcha_attempts`, absent without attempts
    pub captcha_success_rate: Option<f64>,
    /// Bounded list of error messages
    pub errors: Vec<String>,
    /// Errors not kept because the list was full
    pub dropped_errors: u64,
}

impl SyncRunRecord {
    fn from_row(row: &SqliteRow, sync_key: &SyncKey) -> Result<Self> {
        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(u64::try_from(value).unwrap_or(0))
        };
        let status: String = row.try_get("status")?;
        let started_at: String = row.try_get("started_at")?;
        let finished_at: Option<String> = row.try_get("finished_at")?;
        let errors: String = row.try_get("errors")?;

        Ok(Self {
            run_id: row.try_get("run_id")?,
            sync_key: sync_key.clone(),
            shard_label: row.try_get("shard_label")?,
            started_at: parse_timestamp(&started_at)?,
            finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            status: status
                .parse()
                .map_err(|e: platewatch_core::PlateWatchError| DatabaseError::Decode(e.to_string()))?,
            plates_found: count("plates_found")?,
            stations_total: count("stations_total")?,
            stations_success: count("stations_success")?,
            stations_failed: count("stations_failed")?,
            stations_skipped: count("stations_skipped")?,
            captcha_attempts: count("captcha_attempts")?,
            captcha_success: count("captcha_success")?,
            insert_failures: count("insert_failures")?,
            captcha_success_rate: row.try_get("captcha_success_rate")?,
            errors: serde_json::from_str(&errors)?,
            dropped_errors: count("dropped_errors")?,
        })
    }
}

/// Insert a run record, overwriting an earlier write of the same run.
pub async fn insert_run(pool: &SqlitePool, record: &SyncRunRecord) -> Result<()> {
    let errors = serde_json::to_string(&record.errors)?;

    sqlx::query(
        "INSERT OR REPLACE INTO sync_runs
            (run_id, sync_key, shard_label, started_at, finished_at, status,
             plates_found, stations_total, stations_success, stations_failed, stations_skipped,
             captcha_attempts, captcha_success, insert_failures, captcha_success_rate,
             errors, dropped_errors)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.run_id)
    .bind(record.sync_key.as_str())
    .bind(&record.shard_label)
    .bind(record.started_at.to_rfc3339())
    .bind(record.finished_at.map(|t| t.to_rfc3339()))
    .bind(record.status.as_str())
    .bind(to_i64(record.plates_found))
    .bind(to_i64(record.stations_total))
    .bind(to_i64(record.stations_success))
    .bind(to_i64(record.stations_failed))
    .bind(to_i64(record.stations_skipped))
    .bind(to_i64(record.captcha_attempts))
    .bind(to_i64(record.captcha_success))
    .bind(to_i64(record.insert_failures))
    .bind(record.captcha_success_rate)
    .bind(errors)
    .bind(to_i64(record.dropped_errors))
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recently started run reported under `sync_key`.
pub async fn latest_run(pool: &SqlitePool, sync_key: &SyncKey) -> Result<Option<SyncRunRecord>> {
    let row = sqlx::query(
        "SELECT * FROM sync_runs WHERE sync_key = ? ORDER BY started_at DESC LIMIT 1",
    )
    .bind(sync_key.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|r| SyncRunRecord::from_row(&r, sync_key)).transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;
    use chrono::Duration;

    fn record(run_id: &str, started_at: DateTime<Utc>) -> SyncRunRecord {
        SyncRunRecord {
            run_id: run_id.to_string(),
            sync_key: SyncKey::shard("north"),
            shard_label: Some("north".to_string()),
            started_at,
            finished_at: Some(started_at + Duration::minutes(5)),
            status: RunStatus::Completed,
            plates_found: 12,
            stations_total: 3,
            stations_success: 2,
            stations_failed: 1,
            stations_skipped: 0,
            captcha_attempts: 4,
            captcha_success: 3,
            insert_failures: 0,
            captcha_success_rate: Some(0.75),
            errors: vec!["2/21/private: captcha attempts exhausted".to_string()],
            dropped_errors: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_latest() {
        let db = Database::open_in_memory().await.unwrap();
        let earlier = Utc::now() - Duration::hours(6);

        insert_run(db.pool(), &record("run-1", earlier)).await.unwrap();
        insert_run(db.pool(), &record("run-2", Utc::now())).await.unwrap();

        let latest = latest_run(db.pool(), &SyncKey::shard("north"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.run_id, "run-2");
        assert_eq!(latest.plates_found, 12);
        assert_eq!(latest.captcha_success_rate, Some(0.75));
        assert_eq!(latest.errors.len(), 1);
        assert!(latest.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_overwrites_same_run() {
        let db = Database::open_in_memory().await.unwrap();
        let mut run = record("run-1", Utc::now());
        run.status = RunStatus::Running;
        run.finished_at = None;
        insert_run(db.pool(), &run).await.unwrap();

        run.status = RunStatus::Failed;
        insert_run(db.pool(), &run).await.unwrap();

        let latest = latest_run(db.pool(), &SyncKey::shard("north"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.status, RunStatus::Failed);
        assert!(latest.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_latest_run_missing() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(latest_run(db.pool(), &SyncKey::full()).await.unwrap().is_none());
    }
}
