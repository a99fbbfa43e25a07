//! The recognition seam used by the CAPTCHA loop.

use crate::error::Result;
use async_trait::async_trait;

/// Turns a CAPTCHA image into a best-effort answer.
///
/// `Ok(None)` means the service answered but produced nothing usable.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Recognize the text in a PNG image.
    async fn solve(&self, image: &[u8]) -> Result<Option<String>>;

    /// Get the solver identifier for logging.
    fn solver_id(&self) -> &'static str;
}

/// Normalize a raw answer and accept it only if it has exactly `len`
/// characters from `[A-Z0-9]`.
#[must_use]
pub fn normalize_answer(raw: &str, len: usize) -> Option<String> {
    let answer: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    let valid = answer.chars().count() == len
        && answer
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

    valid.then_some(answer)
}
