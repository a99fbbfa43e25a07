//! PlateWatch Core - Foundation crate for the plate availability crawler.
//!
//! This crate provides the domain model, error types, configuration and the
//! station roster loader that every other PlateWatch crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with environment overrides
//! - [`types`] - Stations, plate queries, plate records and run statuses
//! - [`roster`] - Strongly typed station roster loading and shard selection
//!
//! # Example
//!
//! ```rust
//! use platewatch_core::{PlateType, RiskTier, Station};
//!
//! let station = Station {
//!     region_id: "2".to_string(),
//!     station_id: "20".to_string(),
//!     name: "Riverside".to_string(),
//!     supports_rental: false,
//!     risk_tier: RiskTier::Normal,
//!     shard_label: "north".to_string(),
//!     window_id: "1".to_string(),
//! };
//!
//! let queries = station.plate_queries();
//! assert_eq!(queries.len(), 1);
//! assert_eq!(queries[0].plate_type, PlateType::Private);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod roster;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, CrawlerConfig, DatabaseConfig, PortalConfig, PortalSelectors,
    SolverConfig,
};
pub use error::{ConfigError, ConfigResult, PlateWatchError, Result};
pub use roster::{select_shard, RosterLoader};
pub use types::{
    PartitionKey, PlateQuery, PlateRecord, PlateType, RiskTier, RunStatus, Station, SyncKey,
};
