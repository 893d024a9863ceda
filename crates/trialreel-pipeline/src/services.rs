//! Service seams the orchestrator runs against.
//!
//! Every external capability (text generation, image synthesis, slide
//! rasterization, narration synthesis, video encoding, background
//! removal) enters the orchestrator as a trait object, so scenario
//! tests substitute canned implementations without touching the stage
//! sequencing.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use trialreel_genai::{GeminiClient, GeminiConfig, ImageGenerator, PollinationsClient, TextGenerator};
use trialreel_media::{FfmpegAssembler, MediaResult, SlideCompositor, SlideRenderer, VideoEncoder};
use trialreel_tts::{Synthesizer, TieredSynthesizer};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// Background masking as seen by the orchestrator.
///
/// The ONNX implementation lives behind the `bg-removal` feature; when
/// no implementation is wired in, the stage is skipped proactively.
#[async_trait]
pub trait BackgroundStage: Send + Sync {
    async fn mask(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// ONNX-backed [`BackgroundStage`], running inference off the async
/// runtime's worker threads.
#[cfg(feature = "bg-removal")]
pub struct OnnxBackgroundStage {
    remover: Arc<trialreel_media::BackgroundRemover>,
}

#[cfg(feature = "bg-removal")]
impl OnnxBackgroundStage {
    /// Load the model named by `BG_REMOVAL_MODEL`, or `None` when the
    /// variable is unset.
    pub fn from_env() -> MediaResult<Option<Self>> {
        Ok(trialreel_media::BackgroundRemover::from_env()?.map(|remover| Self {
            remover: Arc::new(remover),
        }))
    }
}

#[cfg(feature = "bg-removal")]
#[async_trait]
impl BackgroundStage for OnnxBackgroundStage {
    async fn mask(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let remover = Arc::clone(&self.remover);
        let input = input.to_path_buf();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || remover.remove_background(&input, &output))
            .await
            .map_err(|e| {
                trialreel_media::MediaError::internal(format!("mask task panicked: {e}"))
            })?
    }
}

/// The full set of services one pipeline instance runs against.
pub struct PipelineServices {
    pub text: Arc<dyn TextGenerator>,
    pub image_endpoint: Arc<dyn ImageGenerator>,
    pub compositor: Arc<dyn SlideCompositor>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub background: Option<Arc<dyn BackgroundStage>>,
}

impl PipelineServices {
    /// The production set: Gemini, the prompt-in-path image endpoint,
    /// FFmpeg rendering and assembly, and the tiered synthesizer.
    ///
    /// Fails only on missing mandatory configuration (`GEMINI_API_KEY`);
    /// optional services degrade per their own contracts.
    pub fn from_env(config: &PipelineConfig) -> PipelineResult<Self> {
        let gemini = GeminiClient::new(GeminiConfig::from_env().map_err(to_config_error)?)
            .map_err(to_config_error)?;

        let image_endpoint =
            PollinationsClient::new(config.image_base_url.clone(), config.image_timeout)
                .map_err(to_config_error)?;

        let compositor =
            SlideRenderer::new().with_timeout(config.slide_timeout.as_secs().max(1));

        let synthesizer = TieredSynthesizer::from_env()
            .map_err(|e| PipelineError::config(format!("TTS chain setup failed: {e}")))?;

        let encoder = FfmpegAssembler::new().with_parallelism(config.max_ffmpeg_processes);

        Ok(Self {
            text: Arc::new(gemini),
            image_endpoint: Arc::new(image_endpoint),
            compositor: Arc::new(compositor),
            synthesizer: Arc::new(synthesizer),
            encoder: Arc::new(encoder),
            background: load_background_stage(),
        })
    }
}

fn to_config_error(e: trialreel_genai::GenAiError) -> PipelineError {
    PipelineError::config(e.to_string())
}

#[cfg(feature = "bg-removal")]
fn load_background_stage() -> Option<Arc<dyn BackgroundStage>> {
    match OnnxBackgroundStage::from_env() {
        Ok(Some(stage)) => Some(Arc::new(stage)),
        Ok(None) => {
            tracing::info!("BG_REMOVAL_MODEL not set, background removal disabled");
            None
        }
        Err(e) => {
            tracing::warn!("Background removal model failed to load ({}), disabling", e);
            None
        }
    }
}

#[cfg(not(feature = "bg-removal"))]
fn load_background_stage() -> Option<Arc<dyn BackgroundStage>> {
    None
}
