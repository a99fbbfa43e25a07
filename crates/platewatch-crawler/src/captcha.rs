//! Solve, submit and verify the CAPTCHA gating the result page.
//!
//! Each outer attempt first runs up to `captcha_max_solves` recognitions
//! until one yields a well-formed answer, then submits it and races the
//! success signal against the rejection signals under one deadline:
//!
//! ```text
//! SOLVING ──valid answer──▶ SUBMITTED ──┬─▶ ACCEPTED
//!    │                                  ├─▶ REJECTED  ─┐
//!    └──no valid answer─────────────────┴─▶ TIMED_OUT ─┴─▶ jitter, refresh, next attempt
//! ```

use crate::context::QueryContext;
use crate::error::{CrawlError, Result};
use crate::stats::RunStats;
use platewatch_browser::{BrowserActions, BrowserError};
use platewatch_core::{CrawlerConfig, PortalConfig, SolverConfig};
use platewatch_solver::{normalize_answer, CaptchaSolver, RateLimiter};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Verdict on one submitted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Rejected through a dialog (with its message) or the error modal
    Rejected(String),
    TimedOut,
}

pub struct CaptchaRetryLoop<'a> {
    browser: &'a dyn BrowserActions,
    solver: &'a dyn CaptchaSolver,
    limiter: &'a RateLimiter,
    portal: &'a PortalConfig,
    crawler: &'a CrawlerConfig,
    solver_config: &'a SolverConfig,
}

impl<'a> CaptchaRetryLoop<'a> {
    #[must_use]
    pub fn new(
        browser: &'a dyn BrowserActions,
        solver: &'a dyn CaptchaSolver,
        limiter: &'a RateLimiter,
        portal: &'a PortalConfig,
        crawler: &'a CrawlerConfig,
        solver_config: &'a SolverConfig,
    ) -> Self {
        Self {
            browser,
            solver,
            limiter,
            portal,
            crawler,
            solver_config,
        }
    }

    /// Run outer attempts until an answer is accepted or the budget is spent.
    pub async fn run(&self, ctx: &mut QueryContext, stats: &mut RunStats) -> Result<()> {
        let max_attempts = self.crawler.captcha_max_attempts.max(1);

        for attempt in 1..=max_attempts {
            ctx.outer_attempt = attempt;

            let verdict = match self.solve(ctx).await? {
                Some(answer) => {
                    stats.record_captcha_attempt();
                    self.submit(ctx, &answer).await?
                }
                None => {
                    warn!(query = %ctx.query, attempt, "no usable captcha answer this attempt");
                    Verdict::TimedOut
                }
            };

            match verdict {
                Verdict::Accepted => {
                    stats.record_captcha_success();
                    info!(query = %ctx.query, attempt, "captcha accepted");
                    return Ok(());
                }
                Verdict::Rejected(reason) => {
                    warn!(query = %ctx.query, attempt, %reason, "captcha rejected");
                }
                Verdict::TimedOut => {
                    warn!(query = %ctx.query, attempt, "captcha verdict not observed in time");
                }
            }

            if attempt < max_attempts {
                self.between_attempts(ctx).await?;
            }
        }

        Err(CrawlError::CaptchaExhausted {
            query: ctx.query.to_string(),
            attempts: max_attempts,
        })
    }

    /// Recognize the current image, refreshing it until an answer passes validation.
    async fn solve(&self, ctx: &mut QueryContext) -> Result<Option<String>> {
        let max_solves = self.crawler.captcha_max_solves.max(1);
        let request_timeout = Duration::from_secs(self.solver_config.request_timeout_secs);

        for solve in 1..=max_solves {
            ctx.solve_attempt = solve;
            self.limiter.acquire().await;

            let image = match self
                .browser
                .screenshot_element(&self.portal.selectors.captcha_image)
                .await
            {
                Ok(image) => image,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(query = %ctx.query, solve, "captcha screenshot failed: {e}");
                    self.refresh(ctx).await?;
                    continue;
                }
            };

            let started = Instant::now();
            let answer = tokio::time::timeout(request_timeout, self.solver.solve(&image)).await;
            ctx.pacer.record(started.elapsed());

            match answer {
                Ok(Ok(Some(raw))) => {
                    if let Some(answer) = normalize_answer(&raw, self.crawler.captcha_answer_len) {
                        debug!(query = %ctx.query, solve, %answer, "captcha candidate");
                        return Ok(Some(answer));
                    }
                    debug!(query = %ctx.query, solve, raw = %raw.trim(), "malformed captcha answer");
                }
                Ok(Ok(None)) => debug!(query = %ctx.query, solve, "solver returned nothing"),
                Ok(Err(e)) if e.is_overloaded() => {
                    let cooldown = Duration::from_millis(self.solver_config.overload_cooldown_ms);
                    warn!(
                        solver = self.solver.solver_id(),
                        cooldown_ms = self.solver_config.overload_cooldown_ms,
                        "recognition service overloaded: {e}"
                    );
                    tokio::time::sleep(cooldown).await;
                }
                Ok(Err(e)) => warn!(solver = self.solver.solver_id(), "recognition failed: {e}"),
                Err(_) => warn!(
                    solver = self.solver.solver_id(),
                    "recognition timed out after {request_timeout:?}"
                ),
            }

            if solve < max_solves {
                self.refresh(ctx).await?;
            }
        }

        Ok(None)
    }

    /// Type and submit the answer, then wait for the first verdict signal.
    async fn submit(&self, ctx: &mut QueryContext, answer: &str) -> Result<Verdict> {
        let selectors = &self.portal.selectors;
        self.browser.clear_dialogs().await;

        let keystroke = ctx
            .pacer
            .jitter(self.crawler.keystroke_min_ms, self.crawler.keystroke_max_ms);
        self.browser
            .type_text(&selectors.captcha_input, answer, keystroke)
            .await?;
        ctx.pacer
            .pause(self.crawler.step_pause_min_ms, self.crawler.step_pause_max_ms)
            .await;

        let started = Instant::now();
        self.browser.click(&selectors.submit).await?;

        let success = [selectors.results.as_str(), selectors.no_data.as_str()];
        let rejection = [selectors.reject_modal.as_str()];
        let race = async {
            tokio::select! {
                r = self.poll_visible(&success) => {
                    r.map(|()| Verdict::Accepted)
                }
                r = self.browser.next_dialog() => r.map(Verdict::Rejected),
                r = self.poll_visible(&rejection) => {
                    r.map(|()| Verdict::Rejected("wrong captcha modal".to_string()))
                }
            }
        };
        let outcome = tokio::time::timeout(self.crawler.captcha_result_timeout(), race).await;
        ctx.pacer.record(started.elapsed());

        match outcome {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(e)) if e.is_fatal() => Err(e.into()),
            Ok(Err(e)) => {
                warn!(query = %ctx.query, "error while waiting for captcha verdict: {e}");
                Ok(Verdict::TimedOut)
            }
            Err(_) => Ok(Verdict::TimedOut),
        }
    }

    async fn between_attempts(&self, ctx: &mut QueryContext) -> Result<()> {
        let selectors = &self.portal.selectors;

        if self.browser.is_visible(&selectors.reject_modal).await? {
            if let Err(e) = self.browser.click(&selectors.reject_modal_close).await {
                if e.is_fatal() {
                    return Err(e.into());
                }
                debug!("could not close reject modal: {e}");
            }
        }

        ctx.pacer
            .pause(self.crawler.retry_jitter_min_ms, self.crawler.retry_jitter_max_ms)
            .await;
        self.refresh(ctx).await
    }

    async fn refresh(&self, ctx: &mut QueryContext) -> Result<()> {
        match self
            .browser
            .click(&self.portal.selectors.captcha_refresh)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => debug!(query = %ctx.query, "captcha refresh failed: {e}"),
        }
        ctx.pacer
            .pause(self.crawler.step_pause_min_ms, self.crawler.step_pause_max_ms)
            .await;
        Ok(())
    }

    async fn poll_visible(&self, selectors: &[&str]) -> std::result::Result<(), BrowserError> {
        loop {
            for selector in selectors {
                if self.browser.is_visible(selector).await? {
                    return Ok(());
                }
            }
            tokio::time::sleep(SIGNAL_POLL_INTERVAL).await;
        }
    }
}
