use platewatch_browser::BrowserError;
use platewatch_core::{ConfigError, PlateWatchError};
use platewatch_db::DatabaseError;
use platewatch_solver::SolverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Core(#[from] PlateWatchError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("navigation for {query} failed after {attempts} attempts: {last_error}")]
    NavigationExhausted {
        query: String,
        attempts: u32,
        last_error: String,
    },

    #[error("captcha for {query} not accepted after {attempts} attempts")]
    CaptchaExhausted { query: String, attempts: u32 },

    #[error("results for {query} exceed {pages} pages")]
    PaginationLimit { query: String, pages: u32 },
}

impl CrawlError {
    /// Errors that abort the whole run.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Core(_) | Self::Database(_) | Self::InvalidSelector { .. } => {
                true
            }
            Self::Browser(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Errors that end the current station but let the run continue.
    #[must_use]
    pub fn is_station_fatal(&self) -> bool {
        matches!(self, Self::NavigationExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
