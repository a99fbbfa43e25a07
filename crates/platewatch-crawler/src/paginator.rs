//! Collects plate records across every result page of an accepted query.

use crate::context::QueryContext;
use crate::error::{CrawlError, Result};
use platewatch_browser::{BrowserActions, BrowserError};
use platewatch_core::{CrawlerConfig, PlateRecord, PortalConfig, PortalSelectors};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(150);

fn page_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("valid page marker regex"))
}

fn fraction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.,]\d{1,2}$").expect("valid fraction regex"))
}

fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,.\s]*").expect("valid digits regex"))
}

/// Everything the paginator reads from one rendered result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub no_data: bool,
    pub total_rows: Option<u64>,
    /// `(current, total)` from the page marker
    pub page: Option<(u32, u32)>,
    pub has_next: bool,
    pub rows: Vec<PlateRecord>,
    /// Identifies the rendered page so a page change can be detected
    pub signature: String,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| CrawlError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a price cell like "50,000", "$ 1 200" or "50,000.00" into whole units.
///
/// A trailing separator followed by one or two digits is a fraction and is dropped;
/// every other separator groups thousands.
#[must_use]
pub fn parse_price(text: &str) -> Option<u64> {
    let amount = digits_regex().find(text)?.as_str().trim_end();
    let whole = fraction_regex()
        .find(amount)
        .map_or(amount, |fraction| &amount[..fraction.start()]);

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Whether the element or one of its ancestors is hidden through markup.
fn is_hidden(element: &ElementRef) -> bool {
    std::iter::once(*element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            let el = e.value();
            let style: String = el
                .attr("style")
                .unwrap_or_default()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            el.attr("hidden").is_some()
                || el.attr("aria-hidden") == Some("true")
                || style.contains("display:none")
                || style.contains("visibility:hidden")
        })
}

/// Read page signals from result-page HTML.
pub fn parse_page(html: &str, selectors: &PortalSelectors) -> Result<PageSignals> {
    let document = Html::parse_document(html);
    let first_text = |selector: &Selector| document.select(selector).next().map(|e| element_text(&e));

    let marker_shown = document
        .select(&parse_selector(&selectors.no_data)?)
        .any(|e| !is_hidden(&e));

    let total_rows = first_text(&parse_selector(&selectors.total_rows)?)
        .as_deref()
        .and_then(parse_price);

    let page_text = first_text(&parse_selector(&selectors.page_info)?);
    let page = page_text.as_deref().and_then(|text| {
        let caps = page_marker_regex().captures(text)?;
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    });

    let has_next = document
        .select(&parse_selector(&selectors.next_page)?)
        .next()
        .is_some();

    let plate_cell = parse_selector(&selectors.plate_cell)?;
    let price_cell = parse_selector(&selectors.price_cell)?;
    let mut rows = Vec::new();
    for row in document.select(&parse_selector(&selectors.result_row)?) {
        let plate_no = row
            .select(&plate_cell)
            .next()
            .map(|e| element_text(&e))
            .unwrap_or_default();
        let price_text = row
            .select(&price_cell)
            .next()
            .map(|e| element_text(&e))
            .unwrap_or_default();

        match (plate_no.is_empty(), parse_price(&price_text)) {
            (false, Some(price)) => rows.push(PlateRecord::new(plate_no, price)),
            _ => debug!(%plate_no, %price_text, "skipping unparsable result row"),
        }
    }

    // Rendered rows win over a marker the page left in the markup
    let no_data = marker_shown && rows.is_empty();

    let signature = format!(
        "{}|{}|{}",
        page_text.unwrap_or_default(),
        rows.len(),
        rows.iter().map(|r| r.plate_no.as_str()).collect::<Vec<_>>().join(",")
    );

    Ok(PageSignals {
        no_data,
        total_rows,
        page,
        has_next,
        rows,
        signature,
    })
}

pub struct ResultPaginator<'a> {
    browser: &'a dyn BrowserActions,
    portal: &'a PortalConfig,
    crawler: &'a CrawlerConfig,
}

impl<'a> ResultPaginator<'a> {
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

    /// Walk every page and return all rows in page order, without persisting anything.
    pub async fn collect(&self, ctx: &mut QueryContext) -> Result<Vec<PlateRecord>> {
        let selectors = &self.portal.selectors;
        let mut records = Vec::new();
        let mut pages = 1;
        let mut expected_rows = None;

        loop {
            let html = self.browser.content().await?;
            let signals = parse_page(&html, selectors)?;

            if signals.no_data {
                if pages == 1 {
                    debug!(query = %ctx.query, "no plates available");
                } else {
                    warn!(query = %ctx.query, pages, "no-data marker after first page");
                }
                break;
            }

            expected_rows = expected_rows.or(signals.total_rows);
            debug!(
                query = %ctx.query,
                page = pages,
                rows = signals.rows.len(),
                marker = ?signals.page,
                "result page parsed"
            );
            records.extend(signals.rows);

            if !signals.has_next {
                if let Some((current, total)) = signals.page {
                    if current < total {
                        warn!(query = %ctx.query, current, total, "page marker claims more pages but no next control");
                    }
                }
                break;
            }
            if let Some((current, total)) = signals.page {
                if current >= total {
                    debug!(query = %ctx.query, current, total, "next control present on marked last page, following it");
                }
            }

            if pages >= self.crawler.max_pages {
                return Err(CrawlError::PaginationLimit {
                    query: ctx.query.to_string(),
                    pages,
                });
            }

            ctx.pacer
                .pause(self.crawler.step_pause_min_ms, self.crawler.step_pause_max_ms)
                .await;
            let started = Instant::now();
            self.browser.click(&selectors.next_page).await?;
            self.wait_for_page_change(&signals.signature).await?;
            ctx.pacer.record(started.elapsed());
            pages += 1;
        }

        if let Some(expected) = expected_rows {
            if expected != records.len() as u64 {
                warn!(
                    query = %ctx.query,
                    expected,
                    collected = records.len(),
                    "row count differs from total marker"
                );
            }
        }

        Ok(records)
    }

    async fn wait_for_page_change(&self, previous: &str) -> Result<()> {
        let timeout = self.crawler.page_settle_timeout();
        let deadline = Instant::now() + timeout;

        loop {
            let html = self.browser.content().await?;
            let signals = parse_page(&html, &self.portal.selectors)?;
            if signals.signature != previous {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "result page did not change within {timeout:?}"
                ))
                .into());
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }
}
