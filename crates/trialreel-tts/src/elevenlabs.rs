//! ElevenLabs remote synthesis tier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use trialreel_models::SpeechSource;

use crate::error::{TtsError, TtsResult};
use crate::traits::SpeechTier;

/// Default ElevenLabs API endpoint.
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Rachel, the stock narration voice.
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MODEL_ID: &str = "eleven_monolingual_v1";
const STABILITY: f64 = 0.6;
const SIMILARITY_BOOST: f64 = 0.6;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
}

/// Remote tier backed by the ElevenLabs text-to-speech API.
pub struct ElevenLabsTier {
    client: Client,
    api_key: Option<String>,
    voice_id: String,
    base_url: String,
    force_local: bool,
}

impl ElevenLabsTier {
    /// Build from `ELEVENLABS_API_KEY`, `ELEVENLABS_VOICE_ID`, and
    /// `TTS_FORCE_LOCAL`.
    pub fn from_env() -> TtsResult<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let voice_id = std::env::var("ELEVENLABS_VOICE_ID")
            .unwrap_or_else(|_| DEFAULT_VOICE_ID.to_string());
        let force_local = std::env::var("TTS_FORCE_LOCAL")
            .map(|v| v == "1")
            .unwrap_or(false);
        Self::new(api_key, voice_id, force_local)
    }

    pub fn new(
        api_key: Option<String>,
        voice_id: impl Into<String>,
        force_local: bool,
    ) -> TtsResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TtsError::engine_failed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            voice_id: voice_id.into(),
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            force_local,
        })
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SpeechTier for ElevenLabsTier {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn source(&self) -> SpeechSource {
        SpeechSource::Remote
    }

    fn extension(&self) -> &'static str {
        "mp3"
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && !self.force_local
    }

    async fn run(&self, text: &str, _estimated_duration: f64, out: &Path) -> TtsResult<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TtsError::unavailable("ELEVENLABS_API_KEY not set"))?;

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let body = SpeechRequest {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
            },
        };

        debug!("Requesting ElevenLabs synthesis ({} chars)", text.len());

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::request_failed(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(TtsError::request_failed(format!(
                "ElevenLabs returned {}: {}",
                status, detail
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::request_failed(format!("ElevenLabs body read failed: {e}")))?;
        if bytes.is_empty() {
            return Err(TtsError::request_failed("ElevenLabs returned an empty audio body"));
        }

        tokio::fs::write(out, &bytes).await?;
        info!(
            "ElevenLabs narration written to {} ({} bytes)",
            out.display(),
            bytes.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tier(server: &MockServer, api_key: Option<&str>) -> ElevenLabsTier {
        ElevenLabsTier::new(api_key.map(String::from), "voice123", false)
            .unwrap()
            .with_base_url(server.uri())
    }

    #[test]
    fn test_availability_requires_key() {
        let with_key = ElevenLabsTier::new(Some("k".to_string()), "v", false).unwrap();
        assert!(with_key.available());

        let no_key = ElevenLabsTier::new(None, "v", false).unwrap();
        assert!(!no_key.available());

        let forced = ElevenLabsTier::new(Some("k".to_string()), "v", true).unwrap();
        assert!(!forced.available());
    }

    #[tokio::test]
    async fn test_run_writes_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice123"))
            .and(header("xi-api-key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "voice_settings": {"stability": 0.6, "similarity_boost": 0.6}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3-fake-mp3".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segment_0.mp3");
        tier(&server, Some("secret"))
            .run("Study enrolled 120 adults.", 8.0, &out)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"ID3-fake-mp3");
    }

    #[tokio::test]
    async fn test_run_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segment_0.mp3");
        let err = tier(&server, Some("bad"))
            .run("text", 8.0, &out)
            .await
            .unwrap_err();

        assert!(matches!(err, TtsError::RequestFailed(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_run_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segment_0.mp3");
        let err = tier(&server, Some("secret"))
            .run("text", 8.0, &out)
            .await
            .unwrap_err();

        assert!(matches!(err, TtsError::RequestFailed(_)));
    }
}
