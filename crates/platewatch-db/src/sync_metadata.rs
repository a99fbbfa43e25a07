//! Current status per sync key, the liveness signal for monitors.

use crate::error::{DatabaseError, Result};
use crate::staging::parse_timestamp;
use chrono::{DateTime, Utc};
use platewatch_core::{RunStatus, SyncKey};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Latest status reported under one sync key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Global or shard key
    pub sync_key: SyncKey,
    /// Last reported status
    pub status: RunStatus,
    /// Optional detail, e.g. the reason for a warning
    pub message: Option<String>,
    /// When the status was reported
    pub last_run_at: DateTime<Utc>,
}

impl SyncMetadata {
    /// Status reported now.
    #[must_use]
    pub fn now(sync_key: SyncKey, status: RunStatus, message: Option<String>) -> Self {
        Self {
            sync_key,
            status,
            message,
            last_run_at: Utc::now(),
        }
    }
}

/// Insert or overwrite the record for `metadata.sync_key`.
pub async fn upsert_sync_metadata(pool: &SqlitePool, metadata: &SyncMetadata) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_metadata (sync_key, status, message, last_run_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(sync_key) DO UPDATE SET
             status = excluded.status,
             message = excluded.message,
             last_run_at = excluded.last_run_at",
    )
    .bind(metadata.sync_key.as_str())
    .bind(metadata.status.as_str())
    .bind(&metadata.message)
    .bind(metadata.last_run_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(
        sync_key = %metadata.sync_key,
        status = %metadata.status,
        "sync metadata updated"
    );
    Ok(())
}

/// Fetch the record for `sync_key`, if one was ever written.
pub async fn get_sync_metadata(pool: &SqlitePool, sync_key: &SyncKey) -> Result<Option<SyncMetadata>> {
    let row = sqlx::query(
        "SELECT status, message, last_run_at FROM sync_metadata WHERE sync_key = ?",
    )
    .bind(sync_key.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.try_get("status")?;
    let last_run_at: String = row.try_get("last_run_at")?;

    Ok(Some(SyncMetadata {
        sync_key: sync_key.clone(),
        status: status
            .parse()
            .map_err(|e: platewatch_core::PlateWatchError| DatabaseError::Decode(e.to_string()))?,
        message: row.try_get("message")?,
        last_run_at: parse_timestamp(&last_run_at)?,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_missing_key() {
        let db = Database::open_in_memory().await.unwrap();
        let found = get_sync_metadata(db.pool(), &SyncKey::full()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_status() {
        let db = Database::open_in_memory().await.unwrap();
        let key = SyncKey::shard("north");

        upsert_sync_metadata(db.pool(), &SyncMetadata::now(key.clone(), RunStatus::Running, None))
            .await
            .unwrap();
        upsert_sync_metadata(
            db.pool(),
            &SyncMetadata::now(
                key.clone(),
                RunStatus::Warning,
                Some("staging empty, swap skipped".to_string()),
            ),
        )
        .await
        .unwrap();

        let found = get_sync_metadata(db.pool(), &key).await.unwrap().unwrap();
        assert_eq!(found.status, RunStatus::Warning);
        assert_eq!(found.message.as_deref(), Some("staging empty, swap skipped"));

        // Other keys are independent
        assert!(get_sync_metadata(db.pool(), &SyncKey::full())
            .await
            .unwrap()
            .is_none());
    }
}
