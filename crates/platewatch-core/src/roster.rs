//! Station roster loading from TOML.
//!
//! The roster is loosely typed on disk and strongly typed in memory: every
//! entry is validated into a [`Station`] at load time so a malformed entry
//! fails the run before a browser is ever launched.
//!
//! ```toml
//! [[stations]]
//! region_id = "2"
//! station_id = "20"
//! name = "Riverside"
//! window_id = "1"
//! supports_rental = true
//! risk_tier = "high"
//! shard = "north"
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::types::{RiskTier, Station};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    stations: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    region_id: Option<String>,
    station_id: Option<String>,
    name: Option<String>,
    window_id: Option<String>,
    #[serde(default)]
    supports_rental: bool,
    #[serde(default)]
    risk_tier: Option<String>,
    #[serde(default)]
    shard: Option<String>,
}

impl RawStation {
    fn into_station(self, index: usize) -> ConfigResult<Station> {
        let bad = |reason: String| ConfigError::InvalidStation { index, reason };

        let region_id = required(self.region_id, "region_id").map_err(bad)?;
        let station_id = required(self.station_id, "station_id").map_err(bad)?;
        let window_id = required(self.window_id, "window_id").map_err(bad)?;

        for (field, code) in [
            ("region_id", &region_id),
            ("station_id", &station_id),
            ("window_id", &window_id),
        ] {
            Station::validate_code(field, code).map_err(|e| bad(e.to_string()))?;
        }

        let risk_tier = match self.risk_tier.as_deref().map(str::trim) {
            None | Some("" | "normal") => RiskTier::Normal,
            Some("high") => RiskTier::High,
            Some(other) => return Err(bad(format!("unknown risk_tier '{other}'"))),
        };

        let shard_label = self
            .shard
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());

        let name = self
            .name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{region_id}/{station_id}"));

        Ok(Station {
            region_id,
            station_id,
            name,
            supports_rental: self.supports_rental,
            risk_tier,
            shard_label,
            window_id,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {field}"))
}

/// Loader for the station roster file.
pub struct RosterLoader {
    path: PathBuf,
}

impl RosterLoader {
    /// Create a loader for the given roster file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the roster file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate every station in the roster, in file order.
    ///
    /// # Errors
    /// Returns error if the file is missing or unreadable, is not valid TOML,
    /// contains an invalid entry, or names the same partition twice.
    pub fn load(&self) -> ConfigResult<Vec<Station>> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound {
                path: self.path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let stations = parse_roster(&contents)?;

        info!(
            count = stations.len(),
            path = %self.path.display(),
            "loaded station roster"
        );

        Ok(stations)
    }
}

/// Parse and validate roster TOML.
pub fn parse_roster(contents: &str) -> ConfigResult<Vec<Station>> {
    let file: RosterFile = toml::from_str(contents)?;
    let mut seen = HashSet::new();
    let mut stations = Vec::with_capacity(file.stations.len());

    for (index, raw) in file.stations.into_iter().enumerate() {
        let station = raw.into_station(index)?;

        if !seen.insert(station.partition()) {
            return Err(ConfigError::DuplicateStation {
                region_id: station.region_id,
                station_id: station.station_id,
            });
        }

        debug!(station = %station, shard = %station.shard_label, "validated station");
        stations.push(station);
    }

    Ok(stations)
}

/// Restrict the roster to one shard, or keep every station when `shard` is `None`.
///
/// # Errors
/// Returns `ConfigError::EmptyShard` if nothing is left to crawl.
pub fn select_shard(stations: Vec<Station>, shard: Option<&str>) -> ConfigResult<Vec<Station>> {
    let selected: Vec<Station> = match shard {
        Some(label) => stations
            .into_iter()
            .filter(|s| s.shard_label == label)
            .collect(),
        None => stations,
    };

    if selected.is_empty() {
        return Err(ConfigError::EmptyShard {
            label: shard.unwrap_or("*").to_string(),
        });
    }

    Ok(selected)
}
