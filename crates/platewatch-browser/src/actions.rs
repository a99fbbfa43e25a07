use crate::error::{BrowserError, Result};
use std::time::Duration;

/// Interval between visibility checks in the default `wait_for_selector`.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser actions the crawler needs from a live page.
///
/// Implemented by [`crate::BrowserEngine`] for a real Chromium session and by
/// scripted fakes in tests.
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL, failing with `Timeout` after `timeout`
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Select a dropdown option by value and fire its change event
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// Values of the options a dropdown currently offers
    async fn option_values(&self, selector: &str) -> Result<Vec<String>>;

    /// Type text into a field one character at a time
    async fn type_text(&self, selector: &str, text: &str, per_char_delay: Duration) -> Result<()>;

    /// Click an element by selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Whether an element matching the selector is currently rendered
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Capture a PNG of one element
    async fn screenshot_element(&self, selector: &str) -> Result<Vec<u8>>;

    /// Evaluate a JavaScript expression in the page
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Current page HTML
    async fn content(&self) -> Result<String>;

    /// Resolve with the message of the next JavaScript dialog the page opens.
    ///
    /// Dialogs are accepted by the session as soon as they open.
    async fn next_dialog(&self) -> Result<String>;

    /// Forget dialogs that opened before now
    async fn clear_dialogs(&self) {}

    /// Release the session
    async fn close(&self) -> Result<()>;

    /// Wait for a selector to become visible
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                if self.is_visible(selector).await? {
                    return Ok(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout(format!(
                "{selector} not visible after {timeout:?}"
            ))),
        }
    }
}

/// Validate a URL before handing it to the browser.
pub fn validate_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    if parsed.host_str().is_none() {
        return Err(BrowserError::NavigationError("No host in URL".to_string()));
    }

    Ok(parsed)
}

/// Quote a string as a JavaScript literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
