//! Oracle: the single point of entry for all external AI calls.
//!
//! ARCHITECTURAL RULE: no other module may talk to the Gemini API directly.
//! Components receive `&dyn Oracle` and treat every error as a signal to
//! serve their deterministic fallback; an oracle error never reaches a
//! handler response.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Primary model for all oracle calls.
pub const PRIMARY_MODEL: &str = "gemini-1.5-flash";
/// Secondary model tried once when the primary fails. No further retries.
pub const FALLBACK_MODEL: &str = "gemini-pro";
/// Bound on every oracle round trip; a timeout is handled like any other
/// oracle failure.
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle is not configured (no API key)")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("oracle returned empty content")]
    EmptyContent,
}

/// The AI text-generation capability consumed by the interview components.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generates free text for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Calls the oracle and deserializes the reply as JSON, stripping the
/// markdown code fences the model may wrap around it.
pub async fn generate_json<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    prompt: &str,
) -> Result<T, OracleError> {
    let text = oracle.generate(prompt).await?;
    let text = strip_json_fences(&text);
    serde_json::from_str(text).map_err(OracleError::Parse)
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini REST client
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

/// Gemini client used in production. Tries the primary model, then the
/// secondary model once, then gives up so the caller can fall back.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call_model(&self, model: &str, key: &str, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{GEMINI_API_BASE}/{model}:generateContent?key={key}");

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;

        let text = parsed
            .text()
            .ok_or(OracleError::EmptyContent)?
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(OracleError::EmptyContent);
        }

        debug!("Oracle call succeeded ({model}, {} chars)", text.len());
        Ok(text)
    }
}

#[async_trait]
impl Oracle for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let key = self.api_key.as_deref().ok_or(OracleError::Disabled)?;

        match self.call_model(PRIMARY_MODEL, key, prompt).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                warn!("Primary model failed ({primary_err}), trying {FALLBACK_MODEL}");
                self.call_model(FALLBACK_MODEL, key, prompt).await
            }
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from oracle output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedOracle(String);

    #[async_trait]
    impl Oracle for CannedOracle {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        score: i32,
        passed: bool,
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[tokio::test]
    async fn test_generate_json_parses_fenced_output() {
        let oracle = CannedOracle("```json\n{\"score\": 72, \"passed\": true}\n```".to_string());
        let verdict: Verdict = generate_json(&oracle, "grade this").await.unwrap();
        assert_eq!(
            verdict,
            Verdict {
                score: 72,
                passed: true
            }
        );
    }

    #[tokio::test]
    async fn test_generate_json_rejects_non_json_output() {
        let oracle = CannedOracle("I would rate this candidate highly.".to_string());
        let result = generate_json::<Verdict>(&oracle, "grade this").await;
        assert!(matches!(result, Err(OracleError::Parse(_))));
    }

    #[test]
    fn test_disabled_client_reports_itself() {
        let client = GeminiClient::new(None);
        assert!(!client.is_enabled());
    }
}
