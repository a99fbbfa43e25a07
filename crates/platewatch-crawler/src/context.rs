use crate::pacing::AdaptivePacer;
use platewatch_core::{CrawlerConfig, PlateQuery, Station};
use std::fmt;

/// Retry state carried through every stage of one plate query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query: PlateQuery,
    pub station_name: String,
    /// 1-based outer CAPTCHA attempt, 0 before the loop starts
    pub outer_attempt: u32,
    /// 1-based solve within the current outer attempt
    pub solve_attempt: u32,
    pub pacer: AdaptivePacer,
}

impl QueryContext {
    #[must_use]
    pub fn new(station: &Station, query: PlateQuery, config: &CrawlerConfig) -> Self {
        Self {
            query,
            station_name: station.name.clone(),
            outer_attempt: 0,
            solve_attempt: 0,
            pacer: AdaptivePacer::for_risk_tier(config, station.risk_tier),
        }
    }
}

impl fmt::Display for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.query, self.station_name)
    }
}
