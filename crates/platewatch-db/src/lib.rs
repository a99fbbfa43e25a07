//! PlateWatch Database Layer
//!
//! `SQLite` storage for the crawl pipeline, accessed through `SQLx` with
//! embedded migrations.
//!
//! # Architecture
//!
//! - **Staging**: `staging_plates`, partitioned by `(region_id, station_id)`;
//!   each partition is replaced in a single transaction
//! - **Production**: `plates`, replaced wholesale from staging by the swap
//! - **Bookkeeping**: `sync_metadata` (current status per sync key) and
//!   `sync_runs` (one summary per run)
//!
//! # Example
//!
//! ```ignore
//! use platewatch_db::{Database, PlateStore};
//!
//! let db = Database::open("platewatch.db").await?;
//! let staged = db.staging_count().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod plates;
pub mod staging;
pub mod store;
pub mod sync_metadata;
pub mod sync_runs;

// Re-export commonly used types
pub use error::{DatabaseError, Result};
pub use staging::{StagingRow, STATUS_AVAILABLE};
pub use store::PlateStore;
pub use sync_metadata::SyncMetadata;
pub use sync_runs::SyncRunRecord;

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// High-level database handle owning the connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open a connection pool without touching the schema.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::connect(path).await?;
        Ok(Self { pool })
    }

    /// Open the database and apply pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self::new(path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Migrated private in-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(":memory:").await
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Most recent run summary under `sync_key`.
    pub async fn latest_run(
        &self,
        sync_key: &platewatch_core::SyncKey,
    ) -> Result<Option<SyncRunRecord>> {
        sync_runs::latest_run(&self.pool, sync_key).await
    }

    /// Close the database connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
