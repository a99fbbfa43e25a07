//! The data-store seam used by the crawler.

use crate::error::Result;
use crate::staging::StagingRow;
use crate::sync_metadata::SyncMetadata;
use crate::sync_runs::SyncRunRecord;
use crate::{plates, staging, sync_metadata, sync_runs, Database};
use async_trait::async_trait;
use platewatch_core::{PartitionKey, SyncKey};

/// Storage operations the crawl pipeline needs.
#[async_trait]
pub trait PlateStore: Send + Sync {
    /// Delete every staged row.
    async fn clear_all_staging(&self) -> Result<u64>;

    /// Atomically replace one staging partition.
    async fn replace_partition(&self, partition: &PartitionKey, rows: &[StagingRow]) -> Result<u64>;

    /// Number of staged rows.
    async fn staging_count(&self) -> Result<i64>;

    /// Replace production with staging in one transaction. Returns 0 and
    /// leaves production alone when staging is empty.
    async fn swap_production(&self) -> Result<u64>;

    /// Record the current status for a sync key.
    async fn upsert_sync_metadata(&self, metadata: &SyncMetadata) -> Result<()>;

    /// Read the current status for a sync key.
    async fn get_sync_metadata(&self, sync_key: &SyncKey) -> Result<Option<SyncMetadata>>;

    /// Persist a run summary.
    async fn record_run(&self, record: &SyncRunRecord) -> Result<()>;
}

#[async_trait]
impl PlateStore for Database {
    async fn clear_all_staging(&self) -> Result<u64> {
        staging::clear_all_staging(self.pool()).await
    }

    async fn replace_partition(&self, partition: &PartitionKey, rows: &[StagingRow]) -> Result<u64> {
        staging::replace_partition(self.pool(), partition, rows).await
    }

    async fn staging_count(&self) -> Result<i64> {
        staging::staging_count(self.pool()).await
    }

    async fn swap_production(&self) -> Result<u64> {
        plates::swap_production(self.pool()).await
    }

    async fn upsert_sync_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        sync_metadata::upsert_sync_metadata(self.pool(), metadata).await
    }

    async fn get_sync_metadata(&self, sync_key: &SyncKey) -> Result<Option<SyncMetadata>> {
        sync_metadata::get_sync_metadata(self.pool(), sync_key).await
    }

    async fn record_run(&self, record: &SyncRunRecord) -> Result<()> {
        sync_runs::insert_run(self.pool(), record).await
    }
}
