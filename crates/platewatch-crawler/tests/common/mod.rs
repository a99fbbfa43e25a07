//! Scripted portal and solver shared by the crawl tests.

#![allow(dead_code)]

use platewatch_browser::{BrowserActions, BrowserError, Result as BrowserResult};
use platewatch_core::{AppConfig, PortalSelectors, RiskTier, Station};
use platewatch_solver::{CaptchaSolver, RateLimiter, Result as SolverResult, SolverError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub const QUERY_URL: &str = "https://portal.example.gov/plates";
pub const PRIVATE: &str = "1";
pub const RENTAL: &str = "2";

/// How the portal answers the next submitted CAPTCHA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accept,
    RejectDialog,
    RejectModal,
    /// No signal at all, the verdict wait times out
    Silent,
}

#[derive(Debug, Clone, Default)]
struct PortalStation {
    region_id: String,
    plate_options: Vec<String>,
}

#[derive(Debug, Default)]
struct PageState {
    selected: HashMap<String, String>,
    showing_results: bool,
    page: usize,
    modal_open: bool,
}

/// In-memory stand-in for the plate portal.
///
/// Dropdowns cascade from the configured stations, submissions consume the
/// reply script (accepting once it runs dry), and result pages render with the
/// default selectors.
pub struct FakePortal {
    selectors: PortalSelectors,
    stations: HashMap<String, PortalStation>,
    results: HashMap<(String, String), Vec<Vec<(String, u64)>>>,
    replies: Mutex<VecDeque<Reply>>,
    state: Mutex<PageState>,
    failing_navigations: AtomicU32,
    stale_page_marker: bool,
    frozen_pagination: bool,
    session_closed: Mutex<bool>,
    dialog_tx: mpsc::UnboundedSender<String>,
    dialog_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    pub navigations: AtomicU32,
    pub submissions: AtomicU32,
    pub refreshes: AtomicU32,
    pub close_calls: AtomicU32,
    pub typed: Mutex<Vec<String>>,
}

impl FakePortal {
    pub fn new() -> Self {
        let (dialog_tx, dialog_rx) = mpsc::unbounded_channel();
        Self {
            selectors: PortalSelectors::default(),
            stations: HashMap::new(),
            results: HashMap::new(),
            replies: Mutex::new(VecDeque::new()),
            state: Mutex::new(PageState::default()),
            failing_navigations: AtomicU32::new(0),
            stale_page_marker: false,
            frozen_pagination: false,
            session_closed: Mutex::new(false),
            dialog_tx,
            dialog_rx: tokio::sync::Mutex::new(dialog_rx),
            navigations: AtomicU32::new(0),
            submissions: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            typed: Mutex::new(Vec::new()),
        }
    }

    /// List a station in the cascading dropdowns with the plate types it offers.
    pub fn with_station(mut self, region_id: &str, station_id: &str, plate_options: &[&str]) -> Self {
        self.stations.insert(
            station_id.to_string(),
            PortalStation {
                region_id: region_id.to_string(),
                plate_options: plate_options.iter().map(|o| (*o).to_string()).collect(),
            },
        );
        self
    }

    /// Result pages for one station and plate option; no pages renders the no-data marker.
    pub fn with_results(mut self, station_id: &str, plate_option: &str, pages: &[&[(&str, u64)]]) -> Self {
        let pages = pages
            .iter()
            .map(|rows| rows.iter().map(|(p, price)| ((*p).to_string(), *price)).collect())
            .collect();
        self.results
            .insert((station_id.to_string(), plate_option.to_string()), pages);
        self
    }

    pub fn with_replies(self, replies: &[Reply]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .extend(replies.iter().copied());
        self
    }

    pub fn with_failing_navigations(self, count: u32) -> Self {
        self.failing_navigations.store(count, Ordering::SeqCst);
        self
    }

    /// Every result page claims to be "1 / 1", whatever the next control says.
    pub fn with_stale_page_marker(mut self) -> Self {
        self.stale_page_marker = true;
        self
    }

    /// Clicking next succeeds but the page never changes.
    pub fn with_frozen_pagination(mut self) -> Self {
        self.frozen_pagination = true;
        self
    }

    pub fn with_closed_session(self) -> Self {
        *self.session_closed.lock().unwrap() = true;
        self
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if *self.session_closed.lock().unwrap() {
            return Err(BrowserError::SessionClosed("fake portal closed".to_string()));
        }
        Ok(())
    }

    fn selected(&self, selector: &str) -> Option<String> {
        self.state.lock().unwrap().selected.get(selector).cloned()
    }

    fn current_pages(&self) -> Vec<Vec<(String, u64)>> {
        let station = self.selected(&self.selectors.station).unwrap_or_default();
        let option = self.selected(&self.selectors.plate_type).unwrap_or_default();
        self.results
            .get(&(station, option))
            .cloned()
            .unwrap_or_default()
    }

    fn offered(&self, selector: &str) -> Vec<String> {
        let s = &self.selectors;
        let region = self.selected(&s.region);
        let station = self.selected(&s.station);

        if selector == s.region {
            let mut regions: Vec<String> = self.stations.values().map(|st| st.region_id.clone()).collect();
            regions.sort();
            regions.dedup();
            regions
        } else if selector == s.station {
            let mut ids: Vec<String> = self
                .stations
                .iter()
                .filter(|(_, st)| Some(&st.region_id) == region.as_ref())
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();
            ids
        } else if selector == s.window {
            station.map(|_| vec!["1".to_string(), "2".to_string()]).unwrap_or_default()
        } else if selector == s.vehicle_class {
            vec!["C".to_string()]
        } else if selector == s.energy_class {
            vec!["F".to_string()]
        } else if selector == s.plate_type {
            station
                .and_then(|id| self.stations.get(&id))
                .map(|st| st.plate_options.clone())
                .unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    fn render_results(&self) -> String {
        let pages = self.current_pages();
        if pages.is_empty() {
            return r#"<html><body><div class="no-data">No plates available</div></body></html>"#
                .to_string();
        }

        let page = self.state.lock().unwrap().page;
        let total: usize = pages.iter().map(Vec::len).sum();
        let body: String = pages[page]
            .iter()
            .map(|(plate, price)| format!("<tr><td>{plate}</td><td>{price}</td></tr>"))
            .collect();
        let next = if page + 1 < pages.len() {
            r#"<a class="next">Next</a>"#
        } else {
            r#"<a class="next disabled">Next</a>"#
        };

        let (current, last) = if self.stale_page_marker {
            (1, 1)
        } else {
            (page + 1, pages.len())
        };

        format!(
            r#"<html><body>
                <div class="result-total">Total: {total} plates</div>
                <table id="resultTable"><tbody>{body}</tbody></table>
                <div class="page-info">Page {current} / {last}</div>
                <div class="pagination">{next}</div>
            </body></html>"#
        )
    }

    fn on_submit(&self) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Accept);

        match reply {
            Reply::Accept => {
                let mut state = self.state.lock().unwrap();
                state.showing_results = true;
                state.page = 0;
            }
            Reply::RejectDialog => {
                let _ = self.dialog_tx.send("Wrong verification code".to_string());
            }
            Reply::RejectModal => self.state.lock().unwrap().modal_open = true,
            Reply::Silent => {}
        }
    }
}

#[async_trait::async_trait]
impl BrowserActions for FakePortal {
    async fn navigate(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        self.navigations.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_navigations.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_navigations.store(failing - 1, Ordering::SeqCst);
            return Err(BrowserError::Timeout(format!("{url} did not load")));
        }

        *self.state.lock().unwrap() = PageState::default();
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        if !self.offered(selector).iter().any(|v| v == value) {
            return Err(BrowserError::OptionNotFound {
                selector: selector.to_string(),
                value: value.to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .selected
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn option_values(&self, selector: &str) -> BrowserResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.offered(selector))
    }

    async fn type_text(&self, selector: &str, text: &str, _per_char_delay: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        if selector != self.selectors.captcha_input {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.ensure_open()?;
        let s = &self.selectors;

        if selector == s.submit {
            self.on_submit();
        } else if selector == s.captcha_refresh {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        } else if selector == s.reject_modal_close {
            self.state.lock().unwrap().modal_open = false;
        } else if selector == s.next_page {
            let pages = self.current_pages().len();
            let mut state = self.state.lock().unwrap();
            if !state.showing_results || state.page + 1 >= pages {
                return Err(BrowserError::SelectorNotFound(selector.to_string()));
            }
            if !self.frozen_pagination {
                state.page += 1;
            }
        }
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        self.ensure_open()?;
        let s = &self.selectors;
        let (showing_results, modal_open) = {
            let state = self.state.lock().unwrap();
            (state.showing_results, state.modal_open)
        };

        let visible = if selector == s.results {
            showing_results && !self.current_pages().is_empty()
        } else if selector == s.no_data {
            showing_results && self.current_pages().is_empty()
        } else if selector == s.reject_modal {
            modal_open
        } else {
            false
        };
        Ok(visible)
    }

    async fn screenshot_element(&self, _selector: &str) -> BrowserResult<Vec<u8>> {
        self.ensure_open()?;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn evaluate(&self, _script: &str) -> BrowserResult<serde_json::Value> {
        self.ensure_open()?;
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        if self.state.lock().unwrap().showing_results {
            Ok(self.render_results())
        } else {
            Ok("<html><body><form id=\"query\"></form></body></html>".to_string())
        }
    }

    async fn next_dialog(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        self.dialog_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BrowserError::SessionClosed("dialog channel closed".to_string()))
    }

    async fn clear_dialogs(&self) {
        if let Ok(mut rx) = self.dialog_rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }

    async fn close(&self) -> BrowserResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.session_closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Solver that plays back a script, answering "AB12" once it runs dry.
pub struct ScriptedSolver {
    answers: Mutex<VecDeque<SolverResult<Option<String>>>>,
    pub calls: AtomicU32,
}

impl ScriptedSolver {
    pub fn new(answers: Vec<SolverResult<Option<String>>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_valid() -> Self {
        Self::new(Vec::new())
    }

    /// Answers that never pass validation, `count` of them.
    pub fn malformed(count: usize) -> Self {
        Self::new((0..count).map(|_| Ok(Some("??".to_string()))).collect())
    }

    pub fn overloaded() -> SolverResult<Option<String>> {
        Err(SolverError::from_api(503, "model is overloaded".to_string()))
    }
}

#[async_trait::async_trait]
impl CaptchaSolver for ScriptedSolver {
    async fn solve(&self, _image: &[u8]) -> SolverResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Some("AB12".to_string())))
    }

    fn solver_id(&self) -> &'static str {
        "scripted"
    }
}

/// Configuration with every pause zeroed and short waits.
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.portal.query_url = QUERY_URL.to_string();

    let crawler = &mut config.crawler;
    crawler.navigation_timeout_ms = 1_000;
    crawler.navigation_retries = 3;
    crawler.navigation_backoff_ms = 0;
    crawler.option_wait_timeout_ms = 50;
    crawler.captcha_result_timeout_ms = 300;
    crawler.retry_jitter_min_ms = 0;
    crawler.retry_jitter_max_ms = 0;
    crawler.step_pause_min_ms = 0;
    crawler.step_pause_max_ms = 0;
    crawler.keystroke_min_ms = 0;
    crawler.keystroke_max_ms = 0;
    crawler.station_pause_ms = 0;
    crawler.region_pause_ms = 0;
    crawler.page_settle_timeout_ms = 500;

    config.solver.overload_cooldown_ms = 0;
    config.solver.request_timeout_secs = 5;
    config
}

pub fn limiter() -> RateLimiter {
    RateLimiter::new(1_000, Duration::from_secs(60), Duration::ZERO)
}

pub fn station(region_id: &str, station_id: &str, supports_rental: bool, shard: &str) -> Station {
    Station {
        region_id: region_id.to_string(),
        station_id: station_id.to_string(),
        name: format!("Station {station_id}"),
        supports_rental,
        risk_tier: RiskTier::Normal,
        shard_label: shard.to_string(),
        window_id: "1".to_string(),
    }
}
