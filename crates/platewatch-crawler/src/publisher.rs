//! Partition writes and the guarded production swap.

use crate::error::Result;
use chrono::{DateTime, Utc};
use platewatch_core::{PartitionKey, PlateQuery, PlateRecord};
use platewatch_db::{PlateStore, StagingRow};
use std::collections::HashMap;
use tracing::{info, warn};

/// What the swap did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Production now holds `rows` rows copied from staging
    Swapped { rows: u64 },
    /// Staging was empty, production left untouched
    Skipped,
}

/// Keep one record per plate number: the last value wins, the first position is kept.
#[must_use]
pub fn dedupe_by_plate(records: Vec<PlateRecord>) -> Vec<PlateRecord> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<PlateRecord> = Vec::with_capacity(records.len());

    for record in records {
        match index.get(&record.plate_no) {
            Some(&pos) => unique[pos] = record,
            None => {
                index.insert(record.plate_no.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Staging rows for everything one query collected, deduplicated.
#[must_use]
pub fn staging_rows(
    query: &PlateQuery,
    records: Vec<PlateRecord>,
    updated_at: DateTime<Utc>,
) -> Vec<StagingRow> {
    dedupe_by_plate(records)
        .into_iter()
        .map(|record| StagingRow::new(query, record, updated_at))
        .collect()
}

pub struct StagingPublisher<'a> {
    store: &'a dyn PlateStore,
}

impl<'a> StagingPublisher<'a> {
    #[must_use]
    pub fn new(store: &'a dyn PlateStore) -> Self {
        Self { store }
    }

    /// Replace a station's partition with `rows`.
    pub async fn publish_partition(
        &self,
        partition: &PartitionKey,
        rows: &[StagingRow],
    ) -> Result<u64> {
        let inserted = self.store.replace_partition(partition, rows).await?;
        info!(%partition, rows = inserted, "staging partition published");
        Ok(inserted)
    }

    /// Replace production with staging unless staging is empty.
    ///
    /// The store checks emptiness inside the swap transaction, so a
    /// concurrent staging clear cannot leave production empty.
    pub async fn publish_swap(&self) -> Result<SwapOutcome> {
        let rows = self.store.swap_production().await?;
        if rows == 0 {
            warn!("staging is empty, production swap skipped");
            return Ok(SwapOutcome::Skipped);
        }

        info!(rows, "production replaced from staging");
        Ok(SwapOutcome::Swapped { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platewatch_core::PlateType;

    #[test]
    fn test_dedupe_last_wins() {
        let records = vec![
            PlateRecord::new("A", 10),
            PlateRecord::new("B", 20),
            PlateRecord::new("A", 15),
        ];
        assert_eq!(
            dedupe_by_plate(records),
            vec![PlateRecord::new("A", 15), PlateRecord::new("B", 20)]
        );
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_by_plate(Vec::new()).is_empty());
    }

    #[test]
    fn test_staging_rows_carry_query() {
        let query = PlateQuery {
            region_id: "2".to_string(),
            station_id: "20".to_string(),
            plate_type: PlateType::Rental,
            window_id: "3".to_string(),
        };
        let rows = staging_rows(
            &query,
            vec![PlateRecord::new("R-1", 5), PlateRecord::new("R-1", 6)],
            Utc::now(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 6);
        assert_eq!(rows[0].plate_type, PlateType::Rental);
        assert_eq!(rows[0].window_id, "3");
        assert_eq!(rows[0].status, platewatch_db::STATUS_AVAILABLE);
    }
}
