use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("option '{value}' not offered by {selector}")]
    OptionNotFound { selector: String, value: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("script failed: {0}")]
    ScriptError(String),

    #[error("browser session closed: {0}")]
    SessionClosed(String),
}

impl BrowserError {
    /// A closed session cannot be recovered by retrying.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionClosed(_))
    }

    /// Whether the error came from an elapsed wait.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
