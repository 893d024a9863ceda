//! Image synthesis with retry, prompt simplification, and a placeholder
//! fallback.
//!
//! The endpoint client is a thin HTTP wrapper; [`ImageSynthesizer`] layers
//! the recovery policy on top: three attempts with the planned prompt, a
//! model-assisted simplification, three more attempts, then a flat-color
//! placeholder. The synthesizer never errors to the caller.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use reqwest::Client;
use tracing::{info, warn};

use crate::error::{GenAiError, GenAiResult};
use crate::prompts::PromptStore;
use crate::traits::{ImageGenerator, TextGenerator};

pub const DEFAULT_IMAGE_BASE_URL: &str = "https://image.pollinations.ai/prompt/";

/// Bodies smaller than this are error pages, not images.
const MIN_IMAGE_BYTES: usize = 1000;

/// Attempts per prompt variant.
const ATTEMPTS_PER_PROMPT: u32 = 3;

const PLACEHOLDER_WIDTH: u32 = 1280;
const PLACEHOLDER_HEIGHT: u32 = 720;
/// Matches the slide background so placeholders blend in.
const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([0x2d, 0x34, 0x36]);

/// Prompt-in-path image endpoint client (Pollinations style).
pub struct PollinationsClient {
    base_url: String,
    client: Client,
}

impl PollinationsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GenAiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenAiError::config_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl ImageGenerator for PollinationsClient {
    async fn fetch_image(&self, prompt: &str) -> GenAiResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, urlencoding::encode(prompt));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GenAiError::image_fetch(format!("image request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GenAiError::image_fetch(format!(
                "image endpoint returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenAiError::image_fetch(format!("failed to read image body: {e}")))?;

        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(GenAiError::image_fetch(format!(
                "response too small to be a valid image ({} bytes)",
                bytes.len()
            )));
        }

        image::load_from_memory(&bytes)
            .map_err(|e| GenAiError::image_fetch(format!("response is not a decodable image: {e}")))?;

        Ok(bytes.to_vec())
    }
}

/// Result of one asset's image fetch, placeholder included.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub prompt_used: String,
    pub simplified: bool,
    pub placeholder: bool,
}

/// Retry-and-simplify policy over an [`ImageGenerator`].
pub struct ImageSynthesizer {
    endpoint: Arc<dyn ImageGenerator>,
    simplifier: Option<Arc<dyn TextGenerator>>,
    prompts: PromptStore,
    retry_pause: Duration,
    politeness_pause: Duration,
}

impl ImageSynthesizer {
    pub fn new(endpoint: Arc<dyn ImageGenerator>) -> Self {
        Self {
            endpoint,
            simplifier: None,
            prompts: PromptStore::embedded(),
            retry_pause: Duration::from_secs(1),
            politeness_pause: Duration::from_millis(500),
        }
    }

    /// Text model used to rewrite a failing prompt. Without one, the
    /// fallback keeps the prompt's first eight words.
    pub fn with_simplifier(mut self, simplifier: Arc<dyn TextGenerator>) -> Self {
        self.simplifier = Some(simplifier);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptStore) -> Self {
        self.prompts = prompts;
        self
    }

    /// Shorten the inter-attempt pauses. Tests set these to zero.
    pub fn with_pauses(mut self, retry: Duration, politeness: Duration) -> Self {
        self.retry_pause = retry;
        self.politeness_pause = politeness;
        self
    }

    /// Fetch an image for `prompt`, degrading through simplification to the
    /// placeholder. Never errors.
    pub async fn fetch_with_fallback(&self, name: &str, prompt: &str) -> FetchedImage {
        if let Some(bytes) = self.try_prompt(name, prompt, false).await {
            return FetchedImage {
                bytes,
                prompt_used: prompt.to_string(),
                simplified: false,
                placeholder: false,
            };
        }

        info!(
            "Original prompt failed {} times for '{}'; simplifying",
            ATTEMPTS_PER_PROMPT, name
        );
        let simplified = self.simplify(prompt).await;

        if let Some(bytes) = self.try_prompt(name, &simplified, true).await {
            return FetchedImage {
                bytes,
                prompt_used: simplified,
                simplified: true,
                placeholder: false,
            };
        }

        warn!(
            "Failed to generate image for '{}' after {} total attempts; using placeholder",
            name,
            ATTEMPTS_PER_PROMPT * 2
        );
        FetchedImage {
            bytes: placeholder_png(),
            prompt_used: simplified,
            simplified: true,
            placeholder: true,
        }
    }

    async fn try_prompt(&self, name: &str, prompt: &str, simplified: bool) -> Option<Vec<u8>> {
        let variant = if simplified { " (simplified)" } else { "" };

        for attempt in 1..=ATTEMPTS_PER_PROMPT {
            info!(
                "Requesting image for '{}'{} (attempt {}/{})",
                name, variant, attempt, ATTEMPTS_PER_PROMPT
            );
            match self.endpoint.fetch_image(prompt).await {
                Ok(bytes) => {
                    // Politeness delay keeps the free endpoint happy.
                    tokio::time::sleep(self.politeness_pause).await;
                    return Some(bytes);
                }
                Err(e) => {
                    warn!("Attempt {} failed for '{}': {}", attempt, name, e);
                    if attempt < ATTEMPTS_PER_PROMPT {
                        tokio::time::sleep(self.retry_pause).await;
                    }
                }
            }
        }
        None
    }

    async fn simplify(&self, original: &str) -> String {
        if let Some(simplifier) = &self.simplifier {
            match simplifier.generate(&self.prompts.simplify_prompt(original)).await {
                Ok(text) => {
                    let cleaned = text
                        .trim()
                        .trim_matches(|c| c == '"' || c == '\'')
                        .trim()
                        .to_string();
                    if !cleaned.is_empty() {
                        info!("Simplified prompt to '{}'", cleaned);
                        return cleaned;
                    }
                }
                Err(e) => warn!("Failed to simplify prompt with text model: {}", e),
            }
        }
        original
            .split_whitespace()
            .take(8)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Flat-color PNG substituted when every fetch attempt fails.
pub fn placeholder_png() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, PLACEHOLDER_COLOR);
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .expect("PNG-encode an in-memory buffer");
    bytes
}
