use crate::actions::{js_string, validate_url, BrowserActions};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::Page;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Headless Chromium session bound to a single page.
pub struct BrowserEngine {
    browser: Mutex<Browser>,
    page: Page,
    fingerprint: FingerprintConfig,
    dialogs: Mutex<mpsc::UnboundedReceiver<String>>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BrowserEngine {
    /// Launch Chromium with a randomized fingerprint and open a blank page
    pub async fn launch(headless: bool, window_width: u32, window_height: u32) -> Result<Self> {
        Self::with_fingerprint(
            headless,
            FingerprintConfig::randomized(window_width, window_height),
        )
        .await
    }

    /// Launch Chromium with a specific fingerprint
    pub async fn with_fingerprint(headless: bool, fingerprint: FingerprintConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .arg(format!("--user-agent={}", fingerprint.user_agent));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // The handler stream ends when the connection to Chromium drops
        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {}", e);
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            warn!("browser handler exited");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let mut dialog_events = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let dialog_page = page.clone();
        let dialog_task = tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                debug!(message = %event.message, "javascript dialog opened");
                if let Err(e) = dialog_page
                    .execute(HandleJavaScriptDialogParams::new(true))
                    .await
                {
                    warn!("failed to accept dialog: {}", e);
                }
                if tx.send(event.message.clone()).is_err() {
                    break;
                }
            }
        });

        info!(
            headless,
            width = fingerprint.viewport_width,
            height = fingerprint.viewport_height,
            "browser session started"
        );

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            fingerprint,
            dialogs: Mutex::new(rx),
            alive,
            tasks: vec![handler_task, dialog_task],
        })
    }

    /// Fingerprint this session was launched with
    pub fn fingerprint(&self) -> &FingerprintConfig {
        &self.fingerprint
    }

    fn ensure_open(&self) -> Result<()> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrowserError::SessionClosed(
                "connection to chromium lost".to_string(),
            ))
        }
    }

    async fn eval_raw(&self, script: String) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserEngine {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        validate_url(url)?;

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationError(format!("{url}: {e}"))),
            Err(_) => Err(BrowserError::Timeout(format!(
                "navigation to {url} exceeded {timeout:?}"
            ))),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r"(() => {{
                const el = document.querySelector({sel});
                if (!el) return 'missing';
                const opt = Array.from(el.options || []).find(o => o.value === {val});
                if (!opt) return 'no-option';
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return 'ok';
            }})()",
            sel = js_string(selector),
            val = js_string(value),
        );

        match self.eval_raw(script).await?.as_str() {
            Some("ok") => Ok(()),
            Some("no-option") => Err(BrowserError::OptionNotFound {
                selector: selector.to_string(),
                value: value.to_string(),
            }),
            _ => Err(BrowserError::SelectorNotFound(selector.to_string())),
        }
    }

    async fn option_values(&self, selector: &str) -> Result<Vec<String>> {
        let script = format!(
            r"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                return Array.from(el.options || []).map(o => o.value);
            }})()",
            sel = js_string(selector),
        );

        let value = self.eval_raw(script).await?;
        if value.is_null() {
            return Err(BrowserError::SelectorNotFound(selector.to_string()));
        }
        serde_json::from_value(value).map_err(|e| BrowserError::ScriptError(e.to_string()))
    }

    async fn type_text(&self, selector: &str, text: &str, per_char_delay: Duration) -> Result<()> {
        self.ensure_open()?;
        self.eval_raw(format!(
            "(() => {{ const el = document.querySelector({}); if (el) el.value = ''; }})()",
            js_string(selector)
        ))
        .await?;

        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        for ch in text.chars() {
            element
                .type_str(ch.to_string())
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
            tokio::time::sleep(per_char_delay).await;
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r"(() => {{
                const el = document.querySelector({sel});
                return !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
            }})()",
            sel = js_string(selector),
        );
        Ok(self.eval_raw(script).await?.as_bool().unwrap_or(false))
    }

    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.eval_raw(script.to_string()).await
    }

    async fn content(&self) -> Result<String> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn next_dialog(&self) -> Result<String> {
        self.ensure_open()?;
        self.dialogs
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BrowserError::SessionClosed("dialog listener stopped".to_string()))
    }

    async fn clear_dialogs(&self) {
        let mut dialogs = self.dialogs.lock().await;
        while let Ok(message) = dialogs.try_recv() {
            debug!(%message, "discarding stale dialog");
        }
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::ChromiumError(e.to_string()));
        for task in &self.tasks {
            task.abort();
        }
        self.alive.store(false, Ordering::SeqCst);
        info!("browser session closed");
        result
    }
}
