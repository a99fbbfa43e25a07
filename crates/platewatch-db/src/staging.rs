//! Partitioned staging area written by crawl workers.
//!
//! Each `(region_id, station_id)` partition is owned by exactly one station, so
//! shard workers writing different stations never touch each other's rows.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use platewatch_core::{PartitionKey, PlateQuery, PlateRecord, PlateType};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Availability status written for every scraped plate.
pub const STATUS_AVAILABLE: &str = "AVAILABLE";

/// A scraped plate together with the query it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRow {
    /// Region code
    pub region_id: String,
    /// Station code
    pub station_id: String,
    /// Plate category
    pub plate_type: PlateType,
    /// Service window the query was made at
    pub window_id: String,
    /// Plate number as displayed by the portal
    pub plate_no: String,
    /// Price in whole currency units
    pub price: u64,
    /// Availability status
    pub status: String,
    /// When the row was written
    pub updated_at: DateTime<Utc>,
}

impl StagingRow {
    /// Build an `AVAILABLE` row for a record collected by `query`.
    #[must_use]
    pub fn new(query: &PlateQuery, record: PlateRecord, updated_at: DateTime<Utc>) -> Self {
        Self {
            region_id: query.region_id.clone(),
            station_id: query.station_id.clone(),
            plate_type: query.plate_type,
            window_id: query.window_id.clone(),
            plate_no: record.plate_no,
            price: record.price,
            status: STATUS_AVAILABLE.to_string(),
            updated_at,
        }
    }

    /// Partition this row is stored in.
    #[must_use]
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            region_id: self.region_id.clone(),
            station_id: self.station_id.clone(),
        }
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let plate_type: String = row.try_get("plate_type")?;
        let price: i64 = row.try_get("price")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(Self {
            region_id: row.try_get("region_id")?,
            station_id: row.try_get("station_id")?,
            plate_type: plate_type
                .parse()
                .map_err(|e: platewatch_core::PlateWatchError| DatabaseError::Decode(e.to_string()))?,
            window_id: row.try_get("window_id")?,
            plate_no: row.try_get("plate_no")?,
            price: u64::try_from(price)
                .map_err(|_| DatabaseError::Decode(format!("negative price {price}")))?,
            status: row.try_get("status")?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid timestamp '{value}': {e}")))
}

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Delete every staged row, returning how many were removed.
pub async fn clear_all_staging(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM staging_plates")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Clear one partition and insert `rows` in its place, in a single transaction.
///
/// Every row must belong to `partition`. Returns the number of rows inserted.
pub async fn replace_partition(
    pool: &SqlitePool,
    partition: &PartitionKey,
    rows: &[StagingRow],
) -> Result<u64> {
    if let Some(stray) = rows
        .iter()
        .find(|r| r.region_id != partition.region_id || r.station_id != partition.station_id)
    {
        return Err(DatabaseError::PartitionMismatch {
            partition: partition.to_string(),
            plate_no: stray.plate_no.clone(),
        });
    }

    let mut tx = pool.begin().await?;

    let cleared = sqlx::query("DELETE FROM staging_plates WHERE region_id = ? AND station_id = ?")
        .bind(&partition.region_id)
        .bind(&partition.station_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let mut inserted = 0;
    for row in rows {
        inserted += sqlx::query(
            "INSERT INTO staging_plates
                (region_id, station_id, plate_type, window_id, plate_no, price, status, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.region_id)
        .bind(&row.station_id)
        .bind(row.plate_type.as_str())
        .bind(&row.window_id)
        .bind(&row.plate_no)
        .bind(to_i64(row.price))
        .bind(&row.status)
        .bind(row.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;

    tracing::debug!(%partition, cleared, inserted, "staging partition replaced");
    Ok(inserted)
}

/// Total number of staged rows across all partitions.
pub async fn staging_count(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staging_plates")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Staged rows of one partition, ordered by plate type then plate number.
pub async fn partition_rows(pool: &SqlitePool, partition: &PartitionKey) -> Result<Vec<StagingRow>> {
    let rows = sqlx::query(
        "SELECT region_id, station_id, plate_type, window_id, plate_no, price, status, updated_at
         FROM staging_plates
         WHERE region_id = ? AND station_id = ?
         ORDER BY plate_type, plate_no",
    )
    .bind(&partition.region_id)
    .bind(&partition.station_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(StagingRow::from_row).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    fn query(region: &str, station: &str, plate_type: PlateType) -> PlateQuery {
        PlateQuery {
            region_id: region.to_string(),
            station_id: station.to_string(),
            plate_type,
            window_id: "1".to_string(),
        }
    }

    fn partition(region: &str, station: &str) -> PartitionKey {
        PartitionKey {
            region_id: region.to_string(),
            station_id: station.to_string(),
        }
    }

    fn row(q: &PlateQuery, plate: &str, price: u64) -> StagingRow {
        StagingRow::new(q, PlateRecord::new(plate, price), Utc::now())
    }

    #[tokio::test]
    async fn test_replace_partition_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        let q = query("2", "20", PlateType::Private);

        let inserted = replace_partition(
            db.pool(),
            &q.partition(),
            &[row(&q, "ABC-1234", 50000), row(&q, "ABC-1235", 42000)],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 2);

        let rows = partition_rows(db.pool(), &q.partition()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].plate_no, "ABC-1234");
        assert_eq!(rows[0].price, 50000);
        assert_eq!(rows[0].status, STATUS_AVAILABLE);
        assert_eq!(rows[0].plate_type, PlateType::Private);
    }

    #[tokio::test]
    async fn test_replace_partition_clears_previous_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let q = query("2", "20", PlateType::Private);

        replace_partition(db.pool(), &q.partition(), &[row(&q, "OLD-0001", 1)])
            .await
            .unwrap();
        replace_partition(db.pool(), &q.partition(), &[row(&q, "NEW-0001", 2)])
            .await
            .unwrap();

        let rows = partition_rows(db.pool(), &q.partition()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate_no, "NEW-0001");

        replace_partition(db.pool(), &q.partition(), &[]).await.unwrap();
        assert_eq!(staging_count(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partition_isolation() {
        let db = Database::open_in_memory().await.unwrap();
        let q20 = query("2", "20", PlateType::Private);
        let q21 = query("2", "21", PlateType::Rental);

        replace_partition(db.pool(), &q21.partition(), &[row(&q21, "XYZ-0001", 7)])
            .await
            .unwrap();
        replace_partition(db.pool(), &q20.partition(), &[row(&q20, "ABC-1234", 5)])
            .await
            .unwrap();
        replace_partition(db.pool(), &q20.partition(), &[]).await.unwrap();

        let untouched = partition_rows(db.pool(), &partition("2", "21")).await.unwrap();
        assert_eq!(untouched.len(), 1);
        assert_eq!(untouched[0].plate_no, "XYZ-0001");
        assert_eq!(untouched[0].plate_type, PlateType::Rental);
    }

    #[tokio::test]
    async fn test_replace_partition_rejects_foreign_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let q = query("2", "21", PlateType::Private);

        let result = replace_partition(db.pool(), &partition("2", "20"), &[row(&q, "A", 1)]).await;
        assert!(matches!(result, Err(DatabaseError::PartitionMismatch { .. })));
        assert_eq!(staging_count(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_clear() {
        let db = Database::open_in_memory().await.unwrap();
        let q = query("2", "20", PlateType::Private);

        replace_partition(db.pool(), &q.partition(), &[row(&q, "KEEP-0001", 1)])
            .await
            .unwrap();

        // Duplicate primary key makes the second insert fail
        let result = replace_partition(
            db.pool(),
            &q.partition(),
            &[row(&q, "DUP-0001", 1), row(&q, "DUP-0001", 2)],
        )
        .await;
        assert!(result.is_err());

        let rows = partition_rows(db.pool(), &q.partition()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].plate_no, "KEEP-0001");
    }

    #[tokio::test]
    async fn test_clear_all_staging() {
        let db = Database::open_in_memory().await.unwrap();
        let q20 = query("2", "20", PlateType::Private);
        let q31 = query("3", "31", PlateType::Private);

        replace_partition(db.pool(), &q20.partition(), &[row(&q20, "A", 1)])
            .await
            .unwrap();
        replace_partition(db.pool(), &q31.partition(), &[row(&q31, "B", 1)])
            .await
            .unwrap();

        assert_eq!(clear_all_staging(db.pool()).await.unwrap(), 2);
        assert_eq!(staging_count(db.pool()).await.unwrap(), 0);
    }
}
