//! Shared domain types.
//!
//! Stations come from the roster and never change during a run. Each station
//! expands into one or two [`PlateQuery`] values, and every query produces a
//! list of [`PlateRecord`]s once its result pages have been walked.

use crate::error::PlateWatchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Kind of plate offered by a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateType {
    /// Plates for privately owned vehicles
    Private,
    /// Plates for rental fleet vehicles
    Rental,
}

impl PlateType {
    /// Stable lowercase name used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Rental => "rental",
        }
    }
}

impl fmt::Display for PlateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlateType {
    type Err = PlateWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "rental" => Ok(Self::Rental),
            other => Err(PlateWatchError::Validation(format!(
                "unknown plate type '{other}'"
            ))),
        }
    }
}

/// Anti-bot risk classification of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Ordinary pacing
    #[default]
    Normal,
    /// Pacing starts throttled from the first interaction
    High,
}

/// An administrative office endpoint within the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Region (department) code as used by the portal's region dropdown
    pub region_id: String,
    /// Station code as used by the portal's station dropdown
    pub station_id: String,
    /// Human-readable station name
    pub name: String,
    /// Whether rental plates may be offered here
    pub supports_rental: bool,
    /// Anti-bot risk classification
    pub risk_tier: RiskTier,
    /// Shard this station is assigned to
    pub shard_label: String,
    /// Service window code selected after the station
    pub window_id: String,
}

impl Station {
    /// Staging partition owned by this station.
    #[must_use]
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            region_id: self.region_id.clone(),
            station_id: self.station_id.clone(),
        }
    }

    /// Plate queries to run for this station, private first.
    #[must_use]
    pub fn plate_queries(&self) -> Vec<PlateQuery> {
        let mut types = vec![PlateType::Private];
        if self.supports_rental {
            types.push(PlateType::Rental);
        }

        types
            .into_iter()
            .map(|plate_type| PlateQuery {
                region_id: self.region_id.clone(),
                station_id: self.station_id.clone(),
                plate_type,
                window_id: self.window_id.clone(),
            })
            .collect()
    }

    /// Validate a portal code (region, station or window identifier).
    ///
    /// Codes are 1-32 characters of ASCII alphanumerics, `-` or `_`.
    ///
    /// # Errors
    /// Returns error if the code is empty or contains other characters.
    pub fn validate_code(field: &str, code: &str) -> Result<(), PlateWatchError> {
        static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            CODE_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid regex"));

        if regex.is_match(code) {
            Ok(())
        } else {
            Err(PlateWatchError::Validation(format!(
                "invalid {field}: must be 1-32 alphanumeric characters, got '{code}'"
            )))
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.region_id, self.station_id)
    }
}

/// Identity of a staging partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Region code
    pub region_id: String,
    /// Station code
    pub station_id: String,
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region_id, self.station_id)
    }
}

/// One navigable form-state combination that yields a result listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlateQuery {
    /// Region code
    pub region_id: String,
    /// Station code
    pub station_id: String,
    /// Plate type selected in the form
    pub plate_type: PlateType,
    /// Service window code
    pub window_id: String,
}

impl PlateQuery {
    /// Staging partition this query writes into.
    #[must_use]
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            region_id: self.region_id.clone(),
            station_id: self.station_id.clone(),
        }
    }
}

impl fmt::Display for PlateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}#{}",
            self.region_id, self.station_id, self.plate_type, self.window_id
        )
    }
}

/// A single available plate scraped from a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateRecord {
    /// Plate number, unique within a query's result set
    pub plate_no: String,
    /// Minimum bid price in whole currency units
    pub price: u64,
}

impl PlateRecord {
    /// Create a new record.
    #[must_use]
    pub fn new(plate_no: impl Into<String>, price: u64) -> Self {
        Self {
            plate_no: plate_no.into(),
            price,
        }
    }
}

/// Terminal and in-flight statuses of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run in progress
    Running,
    /// Run finished normally
    Completed,
    /// Run finished but something needs attention (e.g. swap skipped)
    Warning,
    /// Run aborted on a fatal error
    Failed,
}

impl RunStatus {
    /// Stable uppercase name used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Warning => "WARNING",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the status ends a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = PlateWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "WARNING" => Ok(Self::Warning),
            "FAILED" => Ok(Self::Failed),
            other => Err(PlateWatchError::Validation(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

/// Identifier of a sync metadata record.
///
/// Full runs and each shard report under distinct keys so concurrently running
/// workers never overwrite each other's heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey(String);

impl SyncKey {
    const FULL: &'static str = "plates_sync";

    /// Key used by unsharded runs and by the finalizer.
    #[must_use]
    pub fn full() -> Self {
        Self(Self::FULL.to_string())
    }

    /// Key used by the worker bound to `label`.
    #[must_use]
    pub fn shard(label: &str) -> Self {
        Self(format!("{}:shard:{label}", Self::FULL))
    }

    /// Key for an optional shard label.
    #[must_use]
    pub fn for_shard(label: Option<&str>) -> Self {
        label.map_or_else(Self::full, Self::shard)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(supports_rental: bool) -> Station {
        Station {
            region_id: "2".to_string(),
            station_id: "20".to_string(),
            name: "Riverside".to_string(),
            supports_rental,
            risk_tier: RiskTier::Normal,
            shard_label: "north".to_string(),
            window_id: "1".to_string(),
        }
    }

    #[test]
    fn test_plate_queries_without_rental() {
        let queries = station(false).plate_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].plate_type, PlateType::Private);
        assert_eq!(queries[0].window_id, "1");
    }

    #[test]
    fn test_plate_queries_with_rental() {
        let queries = station(true).plate_queries();
        let types: Vec<_> = queries.iter().map(|q| q.plate_type).collect();
        assert_eq!(types, vec![PlateType::Private, PlateType::Rental]);
        assert!(queries.iter().all(|q| q.partition() == station(true).partition()));
    }

    #[test]
    fn test_validate_code() {
        assert!(Station::validate_code("region_id", "2").is_ok());
        assert!(Station::validate_code("station_id", "T-20_a").is_ok());
        assert!(Station::validate_code("station_id", "").is_err());
        assert!(Station::validate_code("station_id", "20 ").is_err());
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Warning,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().ok(), Some(status));
        }
        assert!("DONE".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Warning.is_terminal());
    }

    #[test]
    fn test_sync_keys_are_distinct_per_shard() {
        assert_eq!(SyncKey::full().as_str(), "plates_sync");
        assert_eq!(SyncKey::shard("north").as_str(), "plates_sync:shard:north");
        assert_ne!(SyncKey::shard("north"), SyncKey::shard("south"));
        assert_eq!(SyncKey::for_shard(None), SyncKey::full());
    }

    #[test]
    fn test_display_formats() {
        let query = &station(false).plate_queries()[0];
        assert_eq!(query.to_string(), "2/20/private#1");
        assert_eq!(station(false).to_string(), "Riverside (2/20)");
    }
}
