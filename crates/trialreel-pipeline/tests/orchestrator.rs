//! End-to-end orchestration scenarios over stubbed services.
//!
//! Nothing here talks to the network or shells out to FFmpeg: the text
//! and image services are canned, the compositor and encoder write
//! marker files, and narration runs through the real silent tier.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use trialreel_genai::{placeholder_png, GenAiError, GenAiResult, ImageGenerator, TextGenerator};
use trialreel_media::{CompositionReport, MediaResult, SlideCompositor, VideoEncoder};
use trialreel_models::{
    AudioTrack, GeneratedImage, GenerationRequest, RunId, RunStatus, Slide, SlidePlan, Stage,
};
use trialreel_pipeline::{BackgroundStage, Pipeline, PipelineConfig, PipelineServices};
use trialreel_tts::{SilentTier, TieredSynthesizer};

const SCRIPT_JSON: &str = r#"{
    "video_title": "Understanding the BT-401 Study",
    "video_intro": "Welcome! Let's walk through this study together.",
    "segments": [
        {
            "section_title": "What This Trial Tests",
            "narration": "This study follows 120 participants taking a new tablet for 48 weeks.",
            "image_description": "a tablet next to a calendar",
            "educational_goal": "understand the trial purpose"
        },
        {
            "section_title": "How It Works",
            "narration": "The tablet blocks a protein so swelling goes down over time.",
            "image_description": "mechanism of the drug in the body",
            "educational_goal": "understand the mechanism"
        }
    ]
}"#;

const TABLET_ASSETS: &str = r#"[{
    "name": "tablet calendar",
    "style": "flat medical illustration",
    "purpose": "show the dosing schedule",
    "prompt": "a tablet next to a calendar, flat illustration",
    "category": "informational"
}]"#;

const MECHANISM_ASSETS: &str = r#"[{
    "name": "mechanism diagram",
    "style": "flat medical illustration",
    "purpose": "show how the drug works",
    "prompt": "protein blocking mechanism diagram",
    "category": "biological mechanism"
}]"#;

const LAYOUT_JSON: &str = r#"{
    "slide_title": "Planned Title",
    "slide_duration": 7,
    "images": ["tablet_calendar"]
}"#;

/// Canned text model answering each stage by its prompt markers.
struct CannedText {
    assets_response: &'static str,
}

impl Default for CannedText {
    fn default() -> Self {
        Self {
            assets_response: TABLET_ASSETS,
        }
    }
}

#[async_trait]
impl TextGenerator for CannedText {
    async fn generate(&self, prompt: &str) -> GenAiResult<String> {
        if prompt.contains("Available images:") {
            Ok(LAYOUT_JSON.to_string())
        } else if let Some(tail) = prompt.split("Image description:").nth(1) {
            // Only the segment's own description follows the marker.
            if tail.contains("mechanism of the drug") {
                Ok(MECHANISM_ASSETS.to_string())
            } else {
                Ok(self.assets_response.to_string())
            }
        } else if prompt.contains("Simplified prompt:") {
            Ok("simple diagram".to_string())
        } else {
            Ok(SCRIPT_JSON.to_string())
        }
    }
}

struct HealthyImages;

#[async_trait]
impl ImageGenerator for HealthyImages {
    async fn fetch_image(&self, _prompt: &str) -> GenAiResult<Vec<u8>> {
        Ok(placeholder_png())
    }
}

struct DownImages;

#[async_trait]
impl ImageGenerator for DownImages {
    async fn fetch_image(&self, _prompt: &str) -> GenAiResult<Vec<u8>> {
        Err(GenAiError::image_fetch("endpoint returned 503"))
    }
}

/// Compositor writing a marker file instead of invoking FFmpeg.
struct MarkerCompositor;

#[async_trait]
impl SlideCompositor for MarkerCompositor {
    async fn render(
        &self,
        plan: &SlidePlan,
        _narration: &str,
        _pool: &[GeneratedImage],
        out_path: &Path,
    ) -> MediaResult<Slide> {
        tokio::fs::write(out_path, b"frame").await?;
        Ok(Slide {
            segment_index: plan.segment_index,
            path: out_path.to_path_buf(),
            planned_duration: plan.slide_duration,
            is_blank: false,
        })
    }
}

/// Encoder writing a marker file and reporting configurable streams.
struct MarkerEncoder {
    has_audio: bool,
    slides_seen: Arc<AtomicUsize>,
}

impl MarkerEncoder {
    fn new(has_audio: bool) -> (Self, Arc<AtomicUsize>) {
        let slides_seen = Arc::new(AtomicUsize::new(0));
        (
            Self {
                has_audio,
                slides_seen: Arc::clone(&slides_seen),
            },
            slides_seen,
        )
    }
}

#[async_trait]
impl VideoEncoder for MarkerEncoder {
    async fn compose(
        &self,
        slides: &[Slide],
        _tracks: &[AudioTrack],
        _music: Option<&Path>,
        output: &Path,
    ) -> MediaResult<CompositionReport> {
        self.slides_seen.store(slides.len(), Ordering::SeqCst);
        tokio::fs::write(output, b"video").await?;
        Ok(CompositionReport {
            video_path: output.to_path_buf(),
            has_video: true,
            has_audio: self.has_audio,
            duration: 14.0,
        })
    }
}

/// Masking stage that copies the original into the no-background slot.
struct CopyMasker;

#[async_trait]
impl BackgroundStage for CopyMasker {
    async fn mask(&self, input: &Path, output: &Path) -> MediaResult<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

fn test_config(run_root: PathBuf) -> PipelineConfig {
    PipelineConfig {
        run_root,
        image_retry_pause: Duration::ZERO,
        image_politeness_pause: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

fn build_pipeline(
    run_root: PathBuf,
    text: Arc<dyn TextGenerator>,
    image_endpoint: Arc<dyn ImageGenerator>,
    encoder: Arc<dyn VideoEncoder>,
    background: Option<Arc<dyn BackgroundStage>>,
) -> Pipeline {
    let services = PipelineServices {
        text,
        image_endpoint,
        compositor: Arc::new(MarkerCompositor),
        synthesizer: Arc::new(TieredSynthesizer::with_tiers(vec![Box::new(SilentTier)])),
        encoder,
        background,
    };
    Pipeline::new(test_config(run_root), services).unwrap()
}

fn request() -> GenerationRequest {
    GenerationRequest::new(
        "NCT01234567",
        "A study of a new once-daily tablet for adults with joint swelling.",
    )
}

fn run_id() -> RunId {
    RunId::from_string("20250314_092653")
}

#[tokio::test]
async fn test_happy_path_produces_complete_run() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, slides_seen) = MarkerEncoder::new(true);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder),
        None,
    );

    let outcome = pipeline.run_with_id(&request(), run_id()).await;
    assert_eq!(outcome.status, RunStatus::Success);

    let run_dir = &outcome.run_dir;
    assert!(run_dir.ends_with("NCT01234567/20250314_092653"));

    // Every stage persisted its artifacts.
    for file in [
        "outputs/input_summary.txt",
        "outputs/step1_script_raw.json",
        "outputs/step1_script.json",
        "outputs/step2_segment0_raw.json",
        "outputs/step2_segment1_raw.json",
        "outputs/step2_assets.json",
        "outputs/step4_segment0_raw.json",
        "outputs/step4_slides.json",
        "prompts/script_prompt.txt",
        "prompts/simplify_prompt.txt",
        "images/tablet_calendar.png",
        "images/mechanism_diagram.png",
        "slides/slide_0.png",
        "slides/slide_1.png",
        "audio/segment_0.wav",
        "audio/segment_1.wav",
        "final_video.mp4",
        "metadata.json",
    ] {
        assert!(run_dir.join(file).exists(), "missing {file}");
    }
    assert!(!run_dir.join("error.json").exists());

    // The final video carries one clip per script segment.
    assert_eq!(slides_seen.load(Ordering::SeqCst), 2);

    let meta = outcome.metadata.unwrap();
    assert_eq!(meta.status, RunStatus::Success);
    assert_eq!(meta.segments_count, 2);
    assert_eq!(meta.assets_count, 2);
    assert_eq!(meta.images_count, 2);
    assert_eq!(meta.placeholder_images_count, 0);
    assert_eq!(meta.slides_count, 2);
    assert_eq!(meta.blank_slides_count, 0);
    assert_eq!(meta.audio_sources.silent, 2);
    assert_eq!(meta.audio_sources.remote, 0);
    assert!(meta.warnings.is_empty());
    assert_eq!(meta.stage_timings.len(), 8);
    assert_eq!(meta.stage_timings[0].stage, Stage::Script);
    assert_eq!(meta.stage_timings[7].stage, Stage::Compose);

    let paths = outcome.intermediate_output_paths;
    assert!(paths.script.unwrap().exists());
    assert!(paths.assets.unwrap().exists());
    assert!(paths.layout.unwrap().exists());
}

#[tokio::test]
async fn test_empty_summary_fails_script_stage() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, _) = MarkerEncoder::new(true);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder),
        None,
    );

    let req = GenerationRequest::new("NCT01234567", "   ");
    let outcome = pipeline.run_with_id(&req, run_id()).await;

    assert_eq!(outcome.status, RunStatus::Error);
    assert!(outcome.video_path.is_none());

    let record = outcome.error.unwrap();
    assert_eq!(record.stage, Stage::Script);
    assert!(record.completed_stages.is_empty());

    // The failure is persisted next to the partial artifacts.
    let error_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(outcome.run_dir.join("error.json")).unwrap())
            .unwrap();
    assert_eq!(error_json["stage"], "script");
    assert_eq!(error_json["status"], "error");
    assert!(outcome.run_dir.join("metadata.json").exists());
    assert!(!outcome.run_dir.join("final_video.mp4").exists());
}

#[tokio::test]
async fn test_down_image_endpoint_still_completes_with_placeholders() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, _) = MarkerEncoder::new(true);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(DownImages),
        Arc::new(encoder),
        None,
    );

    let outcome = pipeline.run_with_id(&request(), run_id()).await;
    assert_eq!(outcome.status, RunStatus::Success);

    let meta = outcome.metadata.unwrap();
    assert_eq!(meta.images_count, 0);
    assert_eq!(meta.placeholder_images_count, 2);
    assert_eq!(meta.slides_count, 2);

    // Placeholder bytes are still real images on disk.
    let bytes = std::fs::read(outcome.run_dir.join("images/tablet_calendar.png")).unwrap();
    assert!(image_looks_like_png(&bytes));
}

#[tokio::test]
async fn test_missing_audio_stream_surfaces_as_warning() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, _) = MarkerEncoder::new(false);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder),
        None,
    );

    let outcome = pipeline.run_with_id(&request(), run_id()).await;

    // Silent output degrades the run, it does not fail it.
    assert_eq!(outcome.status, RunStatus::Success);
    let meta = outcome.metadata.unwrap();
    assert_eq!(meta.warnings.len(), 1);
    assert!(meta.warnings[0].contains("audio"));
}

#[tokio::test]
async fn test_malformed_asset_output_fails_run_keeping_script() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, _) = MarkerEncoder::new(true);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText {
            assets_response: "I could not come up with any assets, sorry.",
        }),
        Arc::new(HealthyImages),
        Arc::new(encoder),
        None,
    );

    let outcome = pipeline.run_with_id(&request(), run_id()).await;
    assert_eq!(outcome.status, RunStatus::Error);

    let record = outcome.error.unwrap();
    assert_eq!(record.stage, Stage::Assets);
    assert_eq!(record.completed_stages, vec![Stage::Script]);

    // Prior-stage artifacts and the offending raw response survive.
    assert!(outcome.run_dir.join("outputs/step1_script.json").exists());
    assert!(outcome.run_dir.join("outputs/step2_segment0_raw.json").exists());
    assert!(outcome.intermediate_output_paths.script.is_some());
    assert!(outcome.intermediate_output_paths.assets.is_none());
}

#[tokio::test]
async fn test_background_stage_produces_no_bg_variants() {
    let root = tempfile::tempdir().unwrap();
    let (encoder, _) = MarkerEncoder::new(true);
    let pipeline = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder),
        Some(Arc::new(CopyMasker)),
    );

    let outcome = pipeline.run_with_id(&request(), run_id()).await;
    assert_eq!(outcome.status, RunStatus::Success);

    let meta = outcome.metadata.unwrap();
    assert_eq!(meta.background_removed_count, 2);
    assert!(outcome
        .run_dir
        .join("images/no_bg/tablet_calendar_nobg.png")
        .exists());
}

#[tokio::test]
async fn test_fixed_run_id_outputs_are_byte_identical() {
    let root = tempfile::tempdir().unwrap();
    let (encoder_a, _) = MarkerEncoder::new(true);
    let (encoder_b, _) = MarkerEncoder::new(true);

    let first = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder_a),
        None,
    )
    .run_with_id(&request(), run_id())
    .await;

    // The second run lands on the same timestamp and gets its own
    // disambiguated directory rather than touching the first run.
    let second = build_pipeline(
        root.path().to_path_buf(),
        Arc::new(CannedText::default()),
        Arc::new(HealthyImages),
        Arc::new(encoder_b),
        None,
    )
    .run_with_id(&request(), run_id())
    .await;

    assert_ne!(first.run_dir, second.run_dir);
    for file in [
        "outputs/step1_script.json",
        "outputs/step2_assets.json",
        "outputs/step4_slides.json",
    ] {
        let a = std::fs::read(first.run_dir.join(file)).unwrap();
        let b = std::fs::read(second.run_dir.join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between identical runs");
    }
}

fn image_looks_like_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G'])
}
