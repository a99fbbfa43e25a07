//! PlateWatch Crawler - per-station crawl state machine.
//!
//! Drives a [`BrowserActions`](platewatch_browser::BrowserActions) session
//! through the portal's query form, solves the CAPTCHA through a rate-limited
//! [`CaptchaSolver`](platewatch_solver::CaptchaSolver), walks every result
//! page, and publishes into partitioned staging with a guarded swap.
//!
//! ```text
//! StationOrchestrator ─▶ StationFormNavigator ─▶ CaptchaRetryLoop ─▶ ResultPaginator ─▶ StagingPublisher
//!          │                                            │
//!          └──────────── RunStats ◀─────────────────────┘        RateLimiter gates every solve
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use platewatch_crawler::StationOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = StationOrchestrator::new(
//!     config,
//!     Arc::new(browser_engine),
//!     Arc::new(solver),
//!     Arc::new(rate_limiter),
//!     Arc::new(database),
//! );
//!
//! let stats = orchestrator.run(&stations, Some("north")).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod captcha;
#[allow(missing_docs)]
pub mod context;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod finalizer;
#[allow(missing_docs)]
pub mod navigator;
#[allow(missing_docs)]
pub mod orchestrator;
pub mod pacing;
#[allow(missing_docs)]
pub mod paginator;
#[allow(missing_docs)]
pub mod publisher;
#[allow(missing_docs)]
pub mod stats;

// Re-export commonly used types
pub use captcha::{CaptchaRetryLoop, Verdict};
pub use context::QueryContext;
pub use error::{CrawlError, Result};
pub use finalizer::{FinalizeOutcome, Finalizer, FinalizerOptions};
pub use navigator::{NavOutcome, StationFormNavigator};
pub use orchestrator::{record_init_failure, QueryOutcome, StationOrchestrator};
pub use pacing::AdaptivePacer;
pub use paginator::{parse_page, PageSignals, ResultPaginator};
pub use publisher::{dedupe_by_plate, StagingPublisher, SwapOutcome};
pub use stats::{RunStats, StationOutcome};
