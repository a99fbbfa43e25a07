//! Configuration management for PlateWatch.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Every section has defaults so a config file
//! only needs to name what differs; the portal query URL is the one value
//! without a usable default.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the recognition service API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target portal URL, option values and selectors
    pub portal: PortalConfig,
    /// Crawl budgets, timeouts and pacing
    pub crawler: CrawlerConfig,
    /// CAPTCHA recognition service settings
    pub solver: SolverConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Data store settings
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from an explicit path, or from the platform config
    /// directory when `path` is `None`. A missing default file yields defaults;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let config_path = Self::config_path()?;
                if config_path.exists() {
                    Self::load_from(&config_path)
                } else {
                    tracing::debug!("Config file not found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, apply process environment overrides and validate.
    ///
    /// Supports the following environment variables:
    /// - `PLATEWATCH_HEADLESS`: Override browser headless mode (true/false)
    /// - `PLATEWATCH_DATABASE`: Override the database path
    /// - `PLATEWATCH_STATIONS`: Override the station roster path
    /// - `GEMINI_API_KEY`: Recognition service API key
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("PLATEWATCH_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("PLATEWATCH_DATABASE") {
            tracing::debug!("Override database.path from env: {}", val);
            self.database.path = PathBuf::from(val);
        }

        if let Some(val) = lookup("PLATEWATCH_STATIONS") {
            tracing::debug!("Override crawler.stations_file from env: {}", val);
            self.crawler.stations_file = PathBuf::from(val);
        }

        if let Some(val) = lookup(API_KEY_ENV) {
            if !val.trim().is_empty() {
                self.solver.api_key = Some(val.trim().to_string());
            }
        }
    }

    /// Check values that would otherwise fail deep inside a crawl.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.portal.query_url.trim().is_empty() {
            return Err(invalid("portal.query_url", "must not be empty"));
        }
        if url_scheme(&self.portal.query_url).is_none() {
            return Err(invalid("portal.query_url", "must be an http(s) URL"));
        }

        let c = &self.crawler;
        for (field, value) in [
            ("crawler.navigation_retries", c.navigation_retries),
            ("crawler.captcha_max_attempts", c.captcha_max_attempts),
            ("crawler.captcha_max_solves", c.captcha_max_solves),
            ("crawler.max_pages", c.max_pages),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if c.captcha_answer_len == 0 {
            return Err(invalid("crawler.captcha_answer_len", "must be greater than zero"));
        }

        for (field, min, max) in [
            ("crawler.step_pause", c.step_pause_min_ms, c.step_pause_max_ms),
            ("crawler.retry_jitter", c.retry_jitter_min_ms, c.retry_jitter_max_ms),
            ("crawler.keystroke", c.keystroke_min_ms, c.keystroke_max_ms),
        ] {
            if min > max {
                return Err(invalid(field, "minimum exceeds maximum"));
            }
        }

        if c.pacing_fast_threshold_ms >= c.pacing_slow_threshold_ms {
            return Err(invalid(
                "crawler.pacing_fast_threshold_ms",
                "must be below crawler.pacing_slow_threshold_ms",
            ));
        }

        if self.solver.requests_per_interval == 0 {
            return Err(invalid("solver.requests_per_interval", "must be greater than zero"));
        }

        Ok(())
    }

    /// Recognition service API key, required before a crawl starts.
    pub fn require_api_key(&self) -> ConfigResult<&str> {
        self.solver
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential {
                name: API_KEY_ENV.to_string(),
            })
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/platewatch/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("org", "platewatch", "platewatch").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn url_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    (matches!(scheme, "http" | "https") && !rest.is_empty()).then_some(scheme)
}

/// Target portal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// URL of the plate query page
    pub query_url: String,
    /// Option value selected in the vehicle class dropdown
    pub vehicle_class: String,
    /// Option value selected in the energy class dropdown
    pub energy_class: String,
    /// Option value of the private plate type
    pub private_plate_option: String,
    /// Option value of the rental plate type
    pub rental_plate_option: String,
    /// CSS selectors for every element the crawler touches
    pub selectors: PortalSelectors,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            query_url: String::new(),
            vehicle_class: "C".to_string(),
            energy_class: "F".to_string(),
            private_plate_option: "1".to_string(),
            rental_plate_option: "2".to_string(),
            selectors: PortalSelectors::default(),
        }
    }
}

impl PortalConfig {
    /// Option value for a plate type.
    #[must_use]
    pub fn plate_option(&self, plate_type: crate::PlateType) -> &str {
        match plate_type {
            crate::PlateType::Private => &self.private_plate_option,
            crate::PlateType::Rental => &self.rental_plate_option,
        }
    }
}

/// CSS selectors for the query form and the result listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    /// Region dropdown
    pub region: String,
    /// Station dropdown
    pub station: String,
    /// Service window dropdown
    pub window: String,
    /// Vehicle class dropdown
    pub vehicle_class: String,
    /// Energy class dropdown
    pub energy_class: String,
    /// Plate type dropdown
    pub plate_type: String,
    /// CAPTCHA image element
    pub captcha_image: String,
    /// Control that loads a new CAPTCHA image
    pub captcha_refresh: String,
    /// CAPTCHA answer text field
    pub captcha_input: String,
    /// Query submit button
    pub submit: String,
    /// Wrong-CAPTCHA modal
    pub reject_modal: String,
    /// Close button of the wrong-CAPTCHA modal
    pub reject_modal_close: String,
    /// Result listing container
    pub results: String,
    /// One result row
    pub result_row: String,
    /// Plate number cell inside a row
    pub plate_cell: String,
    /// Price cell inside a row
    pub price_cell: String,
    /// "No data" marker
    pub no_data: String,
    /// Total row count marker
    pub total_rows: String,
    /// Current/total page marker
    pub page_info: String,
    /// Enabled next-page control
    pub next_page: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            region: "#region".to_string(),
            station: "#station".to_string(),
            window: "#window".to_string(),
            vehicle_class: "#vehicleClass".to_string(),
            energy_class: "#energyClass".to_string(),
            plate_type: "#plateType".to_string(),
            captcha_image: "#captchaImage".to_string(),
            captcha_refresh: "#captchaRefresh".to_string(),
            captcha_input: "#captchaInput".to_string(),
            submit: "#querySubmit".to_string(),
            reject_modal: "#captchaErrorModal".to_string(),
            reject_modal_close: "#captchaErrorModal .close".to_string(),
            results: "#resultTable".to_string(),
            result_row: "#resultTable tbody tr".to_string(),
            plate_cell: "td:nth-child(1)".to_string(),
            price_cell: "td:nth-child(2)".to_string(),
            no_data: ".no-data".to_string(),
            total_rows: ".result-total".to_string(),
            page_info: ".page-info".to_string(),
            next_page: ".pagination .next:not(.disabled)".to_string(),
        }
    }
}

/// Crawl budgets, timeouts and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Station roster TOML file
    pub stations_file: PathBuf,
    /// Upper bound for one page navigation
    pub navigation_timeout_ms: u64,
    /// Attempts at loading the query page and walking the form
    pub navigation_retries: u32,
    /// Backoff unit between navigation attempts (multiplied by attempt number)
    pub navigation_backoff_ms: u64,
    /// Wait for a dependent dropdown to offer the wanted option
    pub option_wait_timeout_ms: u64,
    /// Outer CAPTCHA attempts per plate query
    pub captcha_max_attempts: u32,
    /// Solver invocations per outer attempt
    pub captcha_max_solves: u32,
    /// Expected CAPTCHA answer length
    pub captcha_answer_len: usize,
    /// Upper bound on waiting for the CAPTCHA verdict
    pub captcha_result_timeout_ms: u64,
    /// Jitter between outer CAPTCHA attempts
    pub retry_jitter_min_ms: u64,
    /// Jitter between outer CAPTCHA attempts
    pub retry_jitter_max_ms: u64,
    /// Base pause between form interactions
    pub step_pause_min_ms: u64,
    /// Base pause between form interactions
    pub step_pause_max_ms: u64,
    /// Per-keystroke delay range when typing
    pub keystroke_min_ms: u64,
    /// Per-keystroke delay range when typing
    pub keystroke_max_ms: u64,
    /// Pause between stations
    pub station_pause_ms: u64,
    /// Pause between regions
    pub region_pause_ms: u64,
    /// Latency below which pacing speeds up
    pub pacing_fast_threshold_ms: u64,
    /// Latency above which pacing slows down
    pub pacing_slow_threshold_ms: u64,
    /// Multiplier applied to pauses when fast
    pub pacing_fast_factor: f64,
    /// Multiplier applied to pauses when slow
    pub pacing_slow_factor: f64,
    /// Assumed latency for the first interactions at high-risk stations
    pub high_risk_initial_latency_ms: u64,
    /// Safety cap on result pages per query
    pub max_pages: u32,
    /// Wait for a new result page to render after paging
    pub page_settle_timeout_ms: u64,
    /// Bound on the error list kept in run stats
    pub max_errors: usize,
    /// How old a shard's status may be for the finalizer to accept it
    pub shard_max_age_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            stations_file: PathBuf::from("stations.toml"),
            navigation_timeout_ms: 30_000,
            navigation_retries: 3,
            navigation_backoff_ms: 2_000,
            option_wait_timeout_ms: 10_000,
            captcha_max_attempts: 10,
            captcha_max_solves: 5,
            captcha_answer_len: 4,
            captcha_result_timeout_ms: 15_000,
            retry_jitter_min_ms: 1_500,
            retry_jitter_max_ms: 4_000,
            step_pause_min_ms: 400,
            step_pause_max_ms: 1_200,
            keystroke_min_ms: 80,
            keystroke_max_ms: 220,
            station_pause_ms: 3_000,
            region_pause_ms: 8_000,
            pacing_fast_threshold_ms: 1_500,
            pacing_slow_threshold_ms: 4_000,
            pacing_fast_factor: 0.75,
            pacing_slow_factor: 1.5,
            high_risk_initial_latency_ms: 5_000,
            max_pages: 200,
            page_settle_timeout_ms: 10_000,
            max_errors: 50,
            shard_max_age_secs: 6 * 60 * 60,
        }
    }
}

impl CrawlerConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// CAPTCHA verdict timeout as a `Duration`.
    #[must_use]
    pub fn captcha_result_timeout(&self) -> Duration {
        Duration::from_millis(self.captcha_result_timeout_ms)
    }

    /// Dependent option wait as a `Duration`.
    #[must_use]
    pub fn option_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.option_wait_timeout_ms)
    }

    /// Page settle wait as a `Duration`.
    #[must_use]
    pub fn page_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.page_settle_timeout_ms)
    }
}

/// CAPTCHA recognition service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// API key (read from `GEMINI_API_KEY`, never written to disk)
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Vision model name
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Requests allowed per refill interval
    pub requests_per_interval: u32,
    /// Refill interval of the token bucket
    pub interval_ms: u64,
    /// Extra wait after a refill boundary before proceeding
    pub safety_margin_ms: u64,
    /// Cooldown after the service reports overload
    pub overload_cooldown_ms: u64,
    /// HTTP timeout for one recognition call
    pub request_timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            requests_per_interval: 15,
            interval_ms: 60_000,
            safety_margin_ms: 1_000,
            overload_cooldown_ms: 30_000,
            request_timeout_secs: 30,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1366,
            window_height: 768,
        }
    }
}

/// Data store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file (or `:memory:`)
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("platewatch.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.portal.query_url = "https://portal.example.gov/plates/query".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.crawler.captcha_max_attempts, 10);
        assert_eq!(config.crawler.captcha_max_solves, 5);
        assert_eq!(config.crawler.captcha_answer_len, 4);
        assert_eq!(config.crawler.navigation_retries, 3);
        assert!(config.browser.headless);
        assert!(config.solver.api_key.is_none());
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r##"
[portal]
query_url = "https://portal.example.gov/plates/query"

[portal.selectors]
captcha_image = "#pickimg"

[crawler]
station_pause_ms = 500
"##;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.portal.selectors.captcha_image, "#pickimg");
        assert_eq!(config.crawler.station_pause_ms, 500);
        // These should be defaults
        assert_eq!(config.portal.selectors.submit, "#querySubmit");
        assert_eq!(config.crawler.region_pause_ms, 8_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "[portal]\nquery_url = \"https://portal.example.gov/q\"\n[database]\npath = \"x.db\"\n",
        )
        .expect("write config");

        let config = AppConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.database.path, PathBuf::from("x.db"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let result = AppConfig::load(Some(&tmp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PLATEWATCH_HEADLESS", "false"),
            ("PLATEWATCH_DATABASE", "/var/lib/platewatch.db"),
            ("PLATEWATCH_STATIONS", "/etc/platewatch/stations.toml"),
            ("GEMINI_API_KEY", " secret "),
        ]
        .into_iter()
        .collect();

        let mut config = valid_config();
        config.apply_env(|name| env.get(name).map(ToString::to_string));

        assert!(!config.browser.headless);
        assert_eq!(config.database.path, PathBuf::from("/var/lib/platewatch.db"));
        assert_eq!(
            config.crawler.stations_file,
            PathBuf::from("/etc/platewatch/stations.toml")
        );
        assert_eq!(config.require_api_key().ok(), Some("secret"));
    }

    #[test]
    fn test_missing_api_key() {
        let config = valid_config();
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingCredential { .. })
        ));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = valid_config();
        config.solver.api_key = Some("secret".to_string());
        let toml_str = toml::to_string_pretty(&config).expect("serialize config");
        assert!(!toml_str.contains("secret"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(AppConfig::default().validate().is_err());

        let mut config = valid_config();
        config.portal.query_url = "ftp://portal".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.crawler.captcha_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.crawler.step_pause_min_ms = 5_000;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.crawler.pacing_fast_threshold_ms = 4_000;
        assert!(config.validate().is_err());

        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_plate_option_lookup() {
        let config = PortalConfig::default();
        assert_eq!(config.plate_option(crate::PlateType::Private), "1");
        assert_eq!(config.plate_option(crate::PlateType::Rental), "2");
    }
}
