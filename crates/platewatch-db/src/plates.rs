//! Consumer-visible production table.

use crate::error::Result;
use crate::staging::StagingRow;
use sqlx::SqlitePool;

/// Replace the production table with the staging contents in one transaction.
///
/// An empty staging table leaves production untouched and returns 0; the
/// emptiness check runs inside the same transaction as the replace. Otherwise
/// returns the number of rows now in production.
pub async fn swap_production(pool: &SqlitePool) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let staged = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM staging_plates")
        .fetch_one(&mut *tx)
        .await?;
    if staged == 0 {
        tx.rollback().await?;
        tracing::warn!("staging is empty, production left in place");
        return Ok(0);
    }

    let removed = sqlx::query("DELETE FROM plates")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let copied = sqlx::query(
        "INSERT INTO plates
            (region_id, station_id, plate_type, window_id, plate_no, price, status, updated_at)
         SELECT region_id, station_id, plate_type, window_id, plate_no, price, status, updated_at
         FROM staging_plates",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    tracing::info!(removed, copied, "production table swapped");
    Ok(copied)
}

/// Number of rows in production.
pub async fn production_count(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plates")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Every production row, ordered by partition, plate type and plate number.
pub async fn production_rows(pool: &SqlitePool) -> Result<Vec<StagingRow>> {
    let rows = sqlx::query(
        "SELECT region_id, station_id, plate_type, window_id, plate_no, price, status, updated_at
         FROM plates
         ORDER BY region_id, station_id, plate_type, plate_no",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(StagingRow::from_row).collect()
}
