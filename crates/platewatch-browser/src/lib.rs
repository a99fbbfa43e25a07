//! Browser session for the plate query portal.
//!
//! Provides headless Chromium control behind the [`BrowserActions`] trait so
//! the crawler can be driven by a real browser or a scripted fake.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use actions::BrowserActions;
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
