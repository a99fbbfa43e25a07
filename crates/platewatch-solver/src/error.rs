//! Error types for CAPTCHA recognition.

use thiserror::Error;

/// Errors that can occur while asking the recognition service for an answer.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The service is temporarily saturated and should be left alone for a while
    #[error("recognition service overloaded: {0}")]
    Overloaded(String),

    /// API error with status code
    #[error("API error: status {status}, {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Response parsing error
    #[error("failed to parse recognition response: {0}")]
    ParseError(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SolverError {
    /// Build an API error, promoting it to `Overloaded` when the message says so.
    #[must_use]
    pub fn from_api(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status == 503 || is_overload_message(&message) {
            Self::Overloaded(format!("status {status}, {message}"))
        } else {
            Self::ApiError { status, message }
        }
    }

    /// Whether the caller should back off before the next request.
    #[must_use]
    pub fn is_overloaded(&self) -> bool {
        match self {
            Self::Overloaded(_) => true,
            Self::Network(e) => is_overload_message(&e.to_string()),
            _ => false,
        }
    }
}

/// Overload is signalled in the message text rather than a dedicated code.
fn is_overload_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["overloaded", "resource_exhausted", "unavailable", "503", "429"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Result type alias for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;
