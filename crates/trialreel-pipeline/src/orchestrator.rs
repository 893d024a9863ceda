//! Run orchestration.
//!
//! One [`Pipeline::run`] call drives the whole generation sequence:
//! script synthesis, asset planning, image generation, optional
//! background removal, slide layout, slide rasterization, narration
//! synthesis, and final composition. Stages run strictly forward and
//! each one persists its output before the next begins, so a failed
//! run keeps every artifact produced so far.
//!
//! Script, asset planning, layout, and composition are mandatory: a
//! failure there halts the run and writes `error.json`. Images,
//! background removal, and narration degrade per item through their
//! own fallbacks and only surface in the metadata counts.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use trialreel_genai::{parse, ImageSynthesizer, PromptStore};
use trialreel_media::CompositionReport;
use trialreel_models::{
    AssetCategory, AssetSpec, AudioTrack, ErrorRecord, GeneratedImage, GenerationOutcome,
    GenerationRequest, IntermediatePaths, RunId, RunMetadata, RunStatus, Script, Slide, SlidePlan,
    SpeechSource, Stage,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::RunLogger;
use crate::runfs::RunPaths;
use crate::services::PipelineServices;

/// The seven-stage generation pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    prompts: PromptStore,
    services: PipelineServices,
    images: ImageSynthesizer,
}

/// Mutable state threaded through one run.
struct RunContext {
    paths: RunPaths,
    logger: RunLogger,
    meta: RunMetadata,
    intermediate: IntermediatePaths,
    completed: Vec<Stage>,
    /// Stage currently executing, for error records when a failure
    /// surfaces as a plain IO or JSON error.
    current: Stage,
}

impl RunContext {
    fn begin(&mut self, stage: Stage) -> Instant {
        self.current = stage;
        self.logger.log_stage(stage, "Stage started");
        Instant::now()
    }

    fn complete(&mut self, stage: Stage, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.meta.stage_timings.push(trialreel_models::StageTiming {
            stage,
            elapsed_ms,
        });
        self.completed.push(stage);
        self.logger
            .log_stage(stage, &format!("Stage completed in {elapsed_ms}ms"));
    }
}

impl Pipeline {
    /// Build a pipeline over an explicit service set.
    pub fn new(config: PipelineConfig, services: PipelineServices) -> PipelineResult<Self> {
        let prompts = match &config.prompts_dir {
            Some(dir) => PromptStore::from_dir(dir)
                .map_err(|e| PipelineError::config(format!("prompt overrides: {e}")))?,
            None => PromptStore::embedded(),
        };

        let images = ImageSynthesizer::new(Arc::clone(&services.image_endpoint))
            .with_simplifier(Arc::clone(&services.text))
            .with_prompts(prompts.clone())
            .with_pauses(config.image_retry_pause, config.image_politeness_pause);

        Ok(Self {
            config,
            prompts,
            services,
            images,
        })
    }

    /// Build the production pipeline from environment configuration.
    pub fn from_env() -> PipelineResult<Self> {
        let config = PipelineConfig::from_env();
        let services = PipelineServices::from_env(&config)?;
        Self::new(config, services)
    }

    /// Run the pipeline for `request` under a fresh timestamp id.
    pub async fn run(&self, request: &GenerationRequest) -> GenerationOutcome {
        self.run_with_id(request, RunId::now()).await
    }

    /// Run the pipeline under an explicit run id (deterministic tests).
    pub async fn run_with_id(&self, request: &GenerationRequest, run_id: RunId) -> GenerationOutcome {
        let paths = match RunPaths::create(&self.config.run_root, &request.trial_id, run_id) {
            Ok(paths) => paths,
            Err(e) => {
                // Nothing on disk to persist into; the outcome is all
                // the caller gets.
                let record = ErrorRecord::new(
                    &request.trial_id,
                    Stage::Script,
                    format!("cannot create run directory: {e}"),
                    Vec::new(),
                );
                return GenerationOutcome {
                    status: RunStatus::Error,
                    run_dir: self.config.run_root.join(&request.trial_id),
                    video_path: None,
                    metadata: None,
                    intermediate_output_paths: IntermediatePaths::default(),
                    error: Some(record),
                };
            }
        };

        let logger = RunLogger::new(&request.trial_id, &paths.run_id);
        let meta = RunMetadata::new(
            &request.trial_id,
            paths.run_id.clone(),
            request.target_duration_seconds,
        );
        let mut ctx = RunContext {
            paths,
            logger,
            meta,
            intermediate: IntermediatePaths::default(),
            completed: Vec::new(),
            current: Stage::Script,
        };

        ctx.logger.log_start(&format!(
            "Generating video for trial {} ({} chars of summary)",
            request.trial_id,
            request.summary_text.len()
        ));

        match self.execute(request, &mut ctx).await {
            Ok(report) => self.finish_success(ctx, report),
            Err(e) => self.finish_error(ctx, e),
        }
    }

    /// Drive the stages in order.
    async fn execute(
        &self,
        request: &GenerationRequest,
        ctx: &mut RunContext,
    ) -> PipelineResult<CompositionReport> {
        // Input and active prompt templates go down first so the run
        // directory alone reproduces what was asked.
        fs::write(ctx.paths.input_summary(), &request.summary_text)?;
        self.prompts
            .copy_into(&ctx.paths.prompts)
            .map_err(|e| PipelineError::config(format!("cannot persist prompts: {e}")))?;

        let started = ctx.begin(Stage::Script);
        let script = self.stage_script(request, &ctx.paths, &ctx.logger).await?;
        ctx.meta.segments_count = script.segments.len();
        ctx.intermediate.script = Some(ctx.paths.script_json());
        ctx.complete(Stage::Script, started);

        let started = ctx.begin(Stage::Assets);
        let specs = self.stage_assets(&script, &ctx.paths).await?;
        ctx.meta.assets_count = specs.len();
        ctx.intermediate.assets = Some(ctx.paths.assets_json());
        ctx.complete(Stage::Assets, started);

        let started = ctx.begin(Stage::Images);
        let mut images = self.stage_images(&specs, &ctx.paths).await;
        ctx.meta.images_count = images.iter().filter(|i| !i.placeholder).count();
        ctx.meta.placeholder_images_count = images.iter().filter(|i| i.placeholder).count();
        ctx.complete(Stage::Images, started);

        let started = ctx.begin(Stage::BackgroundRemoval);
        ctx.meta.background_removed_count =
            self.stage_background(&mut images, &ctx.paths).await;
        ctx.complete(Stage::BackgroundRemoval, started);

        let started = ctx.begin(Stage::Layout);
        let plans = self.stage_layout(&script, &specs, &images, &ctx.paths).await?;
        ctx.intermediate.layout = Some(ctx.paths.slides_json());
        ctx.complete(Stage::Layout, started);

        let started = ctx.begin(Stage::Slides);
        let slides = self.stage_slides(&script, &plans, &images, &ctx.paths).await?;
        ctx.meta.slides_count = slides.len();
        ctx.meta.blank_slides_count = slides.iter().filter(|s| s.is_blank).count();
        ctx.complete(Stage::Slides, started);

        let started = ctx.begin(Stage::Audio);
        let tracks = self.stage_audio(&script, &ctx.paths).await?;
        for track in &tracks {
            match track.source {
                SpeechSource::Remote => ctx.meta.audio_sources.remote += 1,
                SpeechSource::Local => ctx.meta.audio_sources.local += 1,
                SpeechSource::Silent => ctx.meta.audio_sources.silent += 1,
            }
        }
        ctx.complete(Stage::Audio, started);

        let started = ctx.begin(Stage::Compose);
        let report = self
            .stage_compose(&slides, &tracks, request, ctx)
            .await?;
        ctx.complete(Stage::Compose, started);

        Ok(report)
    }

    /// Stage 1: narrate the summary into a validated script.
    async fn stage_script(
        &self,
        request: &GenerationRequest,
        paths: &RunPaths,
        logger: &RunLogger,
    ) -> PipelineResult<Script> {
        if request.summary_text.trim().is_empty() {
            return Err(PipelineError::stage_failed(
                Stage::Script,
                "input summary is empty",
            ));
        }

        let prompt = self.prompts.script_prompt(&request.summary_text);
        let raw = self
            .services
            .text
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Script, e))?;
        fs::write(paths.script_raw_json(), &raw)?;

        let script = parse::parse_script(&raw)
            .map_err(|e| PipelineError::stage_failed(Stage::Script, e))?;

        let validation = script.validate();
        for warning in &validation.warnings {
            logger.log_warning(warning);
        }
        if !validation.is_valid() {
            return Err(PipelineError::stage_failed(
                Stage::Script,
                validation.problems.join("; "),
            ));
        }

        fs::write(paths.script_json(), serde_json::to_string_pretty(&script)?)?;
        info!(
            "Script generated: '{}' with {} segments",
            script.video_title,
            script.segments.len()
        );
        Ok(script)
    }

    /// Stage 2: plan visual assets per segment.
    async fn stage_assets(
        &self,
        script: &Script,
        paths: &RunPaths,
    ) -> PipelineResult<Vec<AssetSpec>> {
        let script_json = serde_json::to_string_pretty(script)?;
        let mut used_ids = HashSet::new();
        let mut specs = Vec::new();

        for segment in &script.segments {
            let prompt = self
                .prompts
                .assets_prompt(&script_json, &segment.image_description);
            let raw = self
                .services
                .text
                .generate(&prompt)
                .await
                .map_err(|e| PipelineError::stage_failed(Stage::Assets, e))?;
            fs::write(paths.segment_raw_json(segment.index), &raw)?;

            let segment_specs = parse::parse_assets(&raw, segment.index, &mut used_ids)
                .map_err(|e| PipelineError::stage_failed(Stage::Assets, e))?;
            if segment_specs.is_empty() {
                warn!(
                    "Segment {} planned no assets, slide will be text-only",
                    segment.index
                );
            }
            specs.extend(segment_specs);
        }

        fs::write(paths.assets_json(), serde_json::to_string_pretty(&specs)?)?;
        info!("Planned {} visual assets", specs.len());
        Ok(specs)
    }

    /// Stage 3: fetch one image per asset, bounded parallel.
    ///
    /// Never fails the run; exhausted retries yield the placeholder and
    /// an unwritable file drops the asset to text-only handling.
    async fn stage_images(&self, specs: &[AssetSpec], paths: &RunPaths) -> Vec<GeneratedImage> {
        let pool = Arc::new(Semaphore::new(self.config.max_image_parallel));

        let futures: Vec<_> = specs
            .iter()
            .map(|spec| {
                let pool = Arc::clone(&pool);
                async move {
                    let _permit = pool.acquire().await.ok()?;
                    let fetched = self.images.fetch_with_fallback(&spec.name, &spec.prompt).await;

                    let path = paths.image_png(&spec.id);
                    if let Err(e) = tokio::fs::write(&path, &fetched.bytes).await {
                        warn!("Cannot write image {} ({}), skipping asset", path.display(), e);
                        return None;
                    }

                    Some(GeneratedImage {
                        asset_id: spec.id.clone(),
                        path,
                        prompt_used: fetched.prompt_used,
                        simplified: fetched.simplified,
                        placeholder: fetched.placeholder,
                        no_bg_path: None,
                    })
                }
            })
            .collect();

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Stage 3.5: background removal, skipped proactively when no
    /// masking stage is wired in. Returns how many variants were made.
    async fn stage_background(&self, images: &mut [GeneratedImage], paths: &RunPaths) -> usize {
        let Some(stage) = &self.services.background else {
            info!("Background removal unavailable, keeping original images");
            return 0;
        };

        let mut removed = 0;
        for image in images.iter_mut() {
            if image.placeholder {
                continue;
            }
            let out = paths.no_bg_png(&image.asset_id);
            match stage.mask(&image.path, &out).await {
                Ok(()) => {
                    image.no_bg_path = Some(out);
                    removed += 1;
                }
                Err(e) => {
                    warn!(
                        "Background removal failed for {} ({}), keeping original",
                        image.asset_id, e
                    );
                }
            }
        }
        removed
    }

    /// Stage 4: plan one slide per segment.
    async fn stage_layout(
        &self,
        script: &Script,
        specs: &[AssetSpec],
        images: &[GeneratedImage],
        paths: &RunPaths,
    ) -> PipelineResult<Vec<SlidePlan>> {
        let script_json = serde_json::to_string_pretty(script)?;
        let assets_json = serde_json::to_string_pretty(specs)?;
        let available: Vec<String> = images
            .iter()
            .map(|i| i.asset_id.as_str().to_string())
            .collect();

        let mut plans = Vec::with_capacity(script.segments.len());
        for segment in &script.segments {
            let layout = segment_layout(segment.index, specs);
            let segment_json = serde_json::to_string_pretty(segment)?;
            let prompt =
                self.prompts
                    .layout_prompt(&script_json, &assets_json, &available, &segment_json);

            let raw = self
                .services
                .text
                .generate(&prompt)
                .await
                .map_err(|e| PipelineError::stage_failed(Stage::Layout, e))?;
            fs::write(paths.layout_segment_raw_json(segment.index), &raw)?;

            let plan = parse::parse_slide_plan(&raw, segment, layout)
                .map_err(|e| PipelineError::stage_failed(Stage::Layout, e))?;
            plans.push(plan);
        }

        fs::write(paths.slides_json(), serde_json::to_string_pretty(&plans)?)?;
        Ok(plans)
    }

    /// Stage 5: rasterize slides, bounded by the FFmpeg pool.
    ///
    /// Per-slide failures already degrade to a blank frame inside the
    /// compositor; an error here means even the blank frame could not
    /// be produced, which leaves composition nothing to work with.
    async fn stage_slides(
        &self,
        script: &Script,
        plans: &[SlidePlan],
        images: &[GeneratedImage],
        paths: &RunPaths,
    ) -> PipelineResult<Vec<Slide>> {
        let pool = Arc::new(Semaphore::new(self.config.max_ffmpeg_processes));

        let futures: Vec<_> = plans
            .iter()
            .map(|plan| {
                let pool = Arc::clone(&pool);
                async move {
                    let _permit = pool
                        .acquire()
                        .await
                        .map_err(|_| PipelineError::stage_failed(Stage::Slides, "pool closed"))?;
                    let narration = script
                        .segments
                        .get(plan.segment_index)
                        .map(|s| s.narration.as_str())
                        .unwrap_or_default();
                    self.services
                        .compositor
                        .render(plan, narration, images, &paths.slide_png(plan.segment_index))
                        .await
                        .map_err(|e| PipelineError::stage_failed(Stage::Slides, e))
                }
            })
            .collect();

        let mut slides = Vec::with_capacity(plans.len());
        for result in futures::future::join_all(futures).await {
            slides.push(result?);
        }
        slides.sort_by_key(|s| s.segment_index);
        Ok(slides)
    }

    /// Stage 6: synthesize narration per segment, bounded parallel.
    async fn stage_audio(&self, script: &Script, paths: &RunPaths) -> PipelineResult<Vec<AudioTrack>> {
        let pool = Arc::new(Semaphore::new(self.config.max_tts_parallel));

        let futures: Vec<_> = script
            .segments
            .iter()
            .map(|segment| {
                let pool = Arc::clone(&pool);
                async move {
                    let _permit = pool
                        .acquire()
                        .await
                        .map_err(|_| PipelineError::stage_failed(Stage::Audio, "pool closed"))?;
                    let estimated = segment.estimated_duration_secs();
                    let (path, source) = self
                        .services
                        .synthesizer
                        .synthesize(&segment.narration, estimated, &paths.audio_stem(segment.index))
                        .await
                        .map_err(|e| PipelineError::stage_failed(Stage::Audio, e))?;
                    Ok::<_, PipelineError>(AudioTrack {
                        segment_index: segment.index,
                        path,
                        source,
                        estimated_duration: estimated,
                    })
                }
            })
            .collect();

        let mut tracks = Vec::with_capacity(script.segments.len());
        for result in futures::future::join_all(futures).await {
            tracks.push(result?);
        }
        tracks.sort_by_key(|t| t.segment_index);
        Ok(tracks)
    }

    /// Stage 7: compose the final video and check its streams.
    async fn stage_compose(
        &self,
        slides: &[Slide],
        tracks: &[AudioTrack],
        request: &GenerationRequest,
        ctx: &mut RunContext,
    ) -> PipelineResult<CompositionReport> {
        let report = self
            .services
            .encoder
            .compose(
                slides,
                tracks,
                request.background_music.as_deref(),
                &ctx.paths.final_video(),
            )
            .await
            .map_err(|e| PipelineError::stage_failed(Stage::Compose, e))?;

        // Post-condition checks surface as metadata warnings, not
        // failures: the file exists and partial output beats none.
        if !report.has_video {
            ctx.meta
                .warnings
                .push("composed video reports no video stream".to_string());
        }
        if !report.has_audio {
            ctx.meta
                .warnings
                .push("composed video has no usable audio stream".to_string());
        }

        ctx.meta.video_path = Some(report.video_path.clone());
        Ok(report)
    }

    fn finish_success(&self, mut ctx: RunContext, report: CompositionReport) -> GenerationOutcome {
        ctx.meta.status = RunStatus::Success;
        if let Err(e) = self.write_metadata(&ctx) {
            // The video exists but the run cannot be marked complete.
            ctx.logger
                .log_error(&format!("cannot write metadata.json: {e}"));
            let record = ErrorRecord::new(
                ctx.meta.trial_id.clone(),
                Stage::Compose,
                format!("metadata write failed: {e}"),
                ctx.completed.clone(),
            );
            return self.error_outcome(ctx, record);
        }

        ctx.logger.log_completion(&format!(
            "final video at {} ({:.1}s)",
            report.video_path.display(),
            report.duration
        ));

        GenerationOutcome {
            status: RunStatus::Success,
            run_dir: ctx.paths.root.clone(),
            video_path: Some(report.video_path),
            metadata: Some(ctx.meta),
            intermediate_output_paths: ctx.intermediate,
            error: None,
        }
    }

    fn finish_error(&self, mut ctx: RunContext, error: PipelineError) -> GenerationOutcome {
        let stage = match &error {
            PipelineError::StageFailed { stage, .. } => *stage,
            _ => ctx.current,
        };
        ctx.logger
            .log_error(&format!("{} stage failed: {}", stage, error));

        let record = ErrorRecord::new(
            ctx.meta.trial_id.clone(),
            stage,
            error.to_string(),
            ctx.completed.clone(),
        );

        if let Err(e) = self.write_error_record(&ctx, &record) {
            ctx.logger
                .log_error(&format!("cannot write error.json: {e}"));
        }
        ctx.meta.status = RunStatus::Error;
        if let Err(e) = self.write_metadata(&ctx) {
            ctx.logger
                .log_error(&format!("cannot write metadata.json: {e}"));
        }

        self.error_outcome(ctx, record)
    }

    fn error_outcome(&self, ctx: RunContext, record: ErrorRecord) -> GenerationOutcome {
        GenerationOutcome {
            status: RunStatus::Error,
            run_dir: ctx.paths.root.clone(),
            video_path: None,
            metadata: Some(ctx.meta),
            intermediate_output_paths: ctx.intermediate,
            error: Some(record),
        }
    }

    fn write_metadata(&self, ctx: &RunContext) -> PipelineResult<()> {
        fs::write(
            ctx.paths.metadata_json(),
            serde_json::to_string_pretty(&ctx.meta)?,
        )?;
        Ok(())
    }

    fn write_error_record(&self, ctx: &RunContext, record: &ErrorRecord) -> PipelineResult<()> {
        fs::write(
            ctx.paths.error_json(),
            serde_json::to_string_pretty(record)?,
        )?;
        Ok(())
    }
}

/// A segment with any mechanism-family asset renders full-bleed;
/// everything else splits text and imagery.
fn segment_layout(segment_index: usize, specs: &[AssetSpec]) -> trialreel_models::SlideLayout {
    let mechanism = specs
        .iter()
        .filter(|s| s.segment_index == segment_index)
        .any(|s| s.category == AssetCategory::Mechanism);
    if mechanism {
        trialreel_models::SlideLayout::FullBleed
    } else {
        trialreel_models::SlideLayout::Split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialreel_models::AssetId;

    fn spec(segment_index: usize, category: AssetCategory) -> AssetSpec {
        AssetSpec {
            id: AssetId::from_name("x"),
            name: "x".to_string(),
            style: String::new(),
            purpose: String::new(),
            prompt: "x".to_string(),
            category,
            segment_index,
        }
    }

    #[test]
    fn test_segment_layout_prefers_full_bleed_for_mechanism() {
        let specs = vec![
            spec(0, AssetCategory::Informational),
            spec(0, AssetCategory::Mechanism),
            spec(1, AssetCategory::Informational),
        ];
        assert_eq!(segment_layout(0, &specs), trialreel_models::SlideLayout::FullBleed);
        assert_eq!(segment_layout(1, &specs), trialreel_models::SlideLayout::Split);
        // A segment with no assets at all still gets the split layout.
        assert_eq!(segment_layout(2, &specs), trialreel_models::SlideLayout::Split);
    }
}
