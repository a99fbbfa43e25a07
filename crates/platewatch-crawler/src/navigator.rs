//! Walks the dependent dropdowns of the query form for one plate query.

use crate::context::QueryContext;
use crate::error::{CrawlError, Result};
use platewatch_browser::{BrowserActions, BrowserError};
use platewatch_core::{CrawlerConfig, PortalConfig};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const OPTION_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of preparing the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Every dropdown is set and the CAPTCHA can be solved
    Ready,
    /// The station does not offer the requested plate type
    Skipped,
}

pub struct StationFormNavigator<'a> {
    browser: &'a dyn BrowserActions,
    portal: &'a PortalConfig,
    crawler: &'a CrawlerConfig,
}

impl<'a> StationFormNavigator<'a> {
    #[must_use]
    pub fn new(
        browser: &'a dyn BrowserActions,
        portal: &'a PortalConfig,
        crawler: &'a CrawlerConfig,
    ) -> Self {
        Self {
            browser,
            portal,
            crawler,
        }
    }

    /// Load the query page and select every dropdown, retrying the whole
    /// sequence with growing backoff.
    pub async fn prepare(&self, ctx: &mut QueryContext) -> Result<NavOutcome> {
        let attempts = self.crawler.navigation_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.walk_form(ctx).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        query = %ctx.query,
                        attempt,
                        max_attempts = attempts,
                        "form navigation failed: {e}"
                    );
                    last_error = e.to_string();

                    if attempt < attempts {
                        let delay = Duration::from_millis(
                            self.crawler.navigation_backoff_ms * u64::from(attempt),
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(CrawlError::NavigationExhausted {
            query: ctx.query.to_string(),
            attempts,
            last_error,
        })
    }

    async fn walk_form(&self, ctx: &mut QueryContext) -> std::result::Result<NavOutcome, BrowserError> {
        let selectors = &self.portal.selectors;

        ctx.pacer
            .measure(
                self.browser
                    .navigate(&self.portal.query_url, self.crawler.navigation_timeout()),
            )
            .await?;
        debug!(query = %ctx.query, "query page loaded");

        // Owned copy: the dropdown waits below borrow the context mutably
        let query = ctx.query.clone();
        let steps = [
            (selectors.region.as_str(), query.region_id.as_str()),
            (selectors.station.as_str(), query.station_id.as_str()),
            (selectors.window.as_str(), query.window_id.as_str()),
            (selectors.vehicle_class.as_str(), self.portal.vehicle_class.as_str()),
            (selectors.energy_class.as_str(), self.portal.energy_class.as_str()),
        ];

        for (selector, value) in steps {
            let offered = self
                .wait_for_options(ctx, selector, |values| values.iter().any(|v| v == value))
                .await?;
            if !offered.iter().any(|v| v == value) {
                return Err(BrowserError::OptionNotFound {
                    selector: selector.to_string(),
                    value: value.to_string(),
                });
            }
            self.browser.select_option(selector, value).await?;
            ctx.pacer
                .pause(self.crawler.step_pause_min_ms, self.crawler.step_pause_max_ms)
                .await;
        }

        let plate_option = self.portal.plate_option(query.plate_type);
        let offered = self
            .wait_for_options(ctx, &selectors.plate_type, |values| !values.is_empty())
            .await?;
        if offered.is_empty() {
            return Err(BrowserError::Timeout(format!(
                "{} never populated",
                selectors.plate_type
            )));
        }
        if !offered.iter().any(|v| v == plate_option) {
            info!(
                query = %ctx.query,
                "plate type not offered at this station, skipping"
            );
            return Ok(NavOutcome::Skipped);
        }

        self.browser
            .select_option(&selectors.plate_type, plate_option)
            .await?;
        ctx.pacer
            .pause(self.crawler.step_pause_min_ms, self.crawler.step_pause_max_ms)
            .await;

        Ok(NavOutcome::Ready)
    }

    /// Poll a dependent dropdown until `ready` holds or the wait elapses,
    /// returning the last observed option values either way.
    async fn wait_for_options<F>(
        &self,
        ctx: &mut QueryContext,
        selector: &str,
        ready: F,
    ) -> std::result::Result<Vec<String>, BrowserError>
    where
        F: Fn(&[String]) -> bool,
    {
        let started = Instant::now();
        let deadline = started + self.crawler.option_wait_timeout();

        loop {
            let values = self.browser.option_values(selector).await?;
            if ready(&values) || Instant::now() >= deadline {
                ctx.pacer.record(started.elapsed());
                return Ok(values);
            }
            tokio::time::sleep(OPTION_POLL_INTERVAL).await;
        }
    }
}
