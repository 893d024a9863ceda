//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use trialreel_genai::DEFAULT_IMAGE_BASE_URL;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory under which run directories are created
    pub run_root: PathBuf,
    /// Maximum concurrent image fetches within the images stage
    pub max_image_parallel: usize,
    /// Maximum concurrent narration syntheses within the audio stage
    pub max_tts_parallel: usize,
    /// Maximum concurrent FFmpeg processes (slide rendering and clip encoding)
    pub max_ffmpeg_processes: usize,
    /// Base URL of the prompt-in-path image synthesis endpoint
    pub image_base_url: String,
    /// Per-attempt timeout for one image fetch
    pub image_timeout: Duration,
    /// Pause between failed image fetch attempts
    pub image_retry_pause: Duration,
    /// Pause after a successful image fetch, to stay polite to the free endpoint
    pub image_politeness_pause: Duration,
    /// Timeout for one slide-rendering FFmpeg invocation
    pub slide_timeout: Duration,
    /// Optional directory of prompt template overrides
    pub prompts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_root: PathBuf::from("runs"),
            max_image_parallel: 4,
            max_tts_parallel: 2,
            max_ffmpeg_processes: 2,
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            image_timeout: Duration::from_secs(60),
            image_retry_pause: Duration::from_secs(1),
            image_politeness_pause: Duration::from_millis(500),
            slide_timeout: Duration::from_secs(120),
            prompts_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            run_root: std::env::var("TRIALREEL_RUN_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("runs")),
            max_image_parallel: std::env::var("TRIALREEL_MAX_IMAGE_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            max_tts_parallel: std::env::var("TRIALREEL_MAX_TTS_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            max_ffmpeg_processes: std::env::var("TRIALREEL_MAX_FFMPEG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            image_base_url: std::env::var("IMAGE_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_BASE_URL.to_string()),
            image_timeout: Duration::from_secs(
                std::env::var("TRIALREEL_IMAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            image_retry_pause: Duration::from_millis(
                std::env::var("TRIALREEL_IMAGE_RETRY_PAUSE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            image_politeness_pause: Duration::from_millis(
                std::env::var("TRIALREEL_IMAGE_POLITENESS_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            slide_timeout: Duration::from_secs(
                std::env::var("TRIALREEL_SLIDE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            prompts_dir: std::env::var("TRIALREEL_PROMPTS_DIR").ok().map(PathBuf::from),
        }
    }
}
