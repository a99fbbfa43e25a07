//! Google Gemini vision adapter.

use crate::error::{Result, SolverError};
use crate::solver::CaptchaSolver;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use platewatch_core::SolverConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const PROMPT: &str = "This image is a CAPTCHA containing exactly 4 characters, \
    uppercase letters A-Z and digits 0-9. Reply with only those 4 characters, \
    no spaces or punctuation.";

/// Solves CAPTCHA images with Gemini's `generateContent` endpoint.
pub struct GeminiVisionSolver {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

impl GeminiVisionSolver {
    /// Create a solver with an explicit model and request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SolverError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Create a solver from the `[solver]` config section.
    ///
    /// # Errors
    /// Returns error if the key is absent or the HTTP client cannot be created.
    pub fn from_config(config: &SolverConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SolverError::Internal("no API key configured".to_string()))?;
        let mut solver = Self::new(
            api_key,
            config.model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        solver.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(solver)
    }

    fn to_api_request(image: &[u8]) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiPart::Text {
                        text: PROMPT.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: GeminiBlob {
                            mime_type: "image/png".to_string(),
                            data: STANDARD.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.0,
                max_output_tokens: 16,
            },
        }
    }

    fn extract_text(response: GeminiResponse) -> Option<String> {
        let candidate = response.candidates.into_iter().next()?;
        let text = candidate
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        (!text.trim().is_empty()).then_some(text)
    }
}

#[async_trait]
impl CaptchaSolver for GeminiVisionSolver {
    async fn solve(&self, image: &[u8]) -> Result<Option<String>> {
        let request = Self::to_api_request(image);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SolverError::from_api(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| SolverError::ParseError(format!("{e}: {body}")))?;

        let text = Self::extract_text(parsed);
        debug!(model = %self.model, answer = ?text, "recognition response");
        Ok(text)
    }

    fn solver_id(&self) -> &'static str {
        "gemini"
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiBlob },
}

#[derive(Debug, Serialize)]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}
