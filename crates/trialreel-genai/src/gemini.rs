//! Gemini text-generation client.
//!
//! All three text stages (script, asset planning, slide layout) and the
//! prompt simplifier go through this client. It returns the raw model text;
//! callers persist that before handing it to [`crate::parse`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{GenAiError, GenAiResult};
use crate::traits::TextGenerator;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Tried in order after the configured model.
const FALLBACK_MODELS: [&str; 3] = [
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.5-pro",
];

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Read settings from the environment. `GEMINI_API_KEY` is required.
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAiError::config_error("GEMINI_API_KEY not set"))?;
        let model = std::env::var("GEMINI_MODEL_NAME")
            .unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.2);

        Ok(Self {
            api_key,
            model,
            temperature,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    temperature: f32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(config: GeminiConfig) -> GenAiResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenAiError::config_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Configured model first, then the fallback list without duplicates.
    fn models_to_try(&self) -> Vec<&str> {
        std::iter::once(self.config.model.as_str())
            .chain(
                FALLBACK_MODELS
                    .iter()
                    .copied()
                    .filter(|m| *m != self.config.model),
            )
            .collect()
    }

    async fn call_model(&self, model: &str, prompt: &str) -> GenAiResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenAiError::request_failed(format!("Gemini API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenAiError::request_failed(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenAiError::request_failed(format!("Failed to parse Gemini response: {e}")))?;

        gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| GenAiError::request_failed("No content in Gemini response"))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> GenAiResult<String> {
        let mut last_error = None;

        for model in self.models_to_try() {
            match self.call_model(model, prompt).await {
                Ok(text) => {
                    if model != self.config.model {
                        info!("Fell back to Gemini model {}", model);
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Gemini model {} failed: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GenAiError::request_failed("All Gemini models failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String, model: &str) -> GeminiConfig {
        GeminiConfig {
            api_key: "test-key".to_string(),
            model: model.to_string(),
            temperature: 0.2,
            base_url,
            timeout: Duration::from_secs(5),
        }
    }

    fn candidates_body(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[tokio::test]
    async fn test_generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidates_body("{\"ok\":1}")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config(server.uri(), "gemini-2.5-flash")).unwrap();
        let text = client.generate("hello").await.unwrap();
        assert_eq!(text, "{\"ok\":1}");
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/custom-model:generateContent"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidates_body("fallback")))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config(server.uri(), "custom-model")).unwrap();
        let text = client.generate("hello").await.unwrap();
        assert_eq!(text, "fallback");
    }

    #[tokio::test]
    async fn test_generate_errors_when_all_models_fail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config(server.uri(), "gemini-2.5-flash")).unwrap();
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, GenAiError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_generate_errors_on_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(config(server.uri(), "gemini-2.5-flash")).unwrap();
        assert!(client.generate("hello").await.is_err());
    }

    #[test]
    fn test_models_to_try_dedupes_primary() {
        let client = GeminiClient::new(config(
            "http://localhost".to_string(),
            "gemini-2.5-flash",
        ))
        .unwrap();
        let models = client.models_to_try();
        assert_eq!(models[0], "gemini-2.5-flash");
        assert_eq!(
            models.iter().filter(|m| **m == "gemini-2.5-flash").count(),
            1
        );
    }
}
