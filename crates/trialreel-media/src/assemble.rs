//! Final video assembly.
//!
//! Slides and narration tracks become per-segment clips, the clips are
//! concatenated with the concat demuxer, and background music is mixed
//! in as a final pass. The finished file is probed before it is handed
//! back: a missing or zero-length audio stream is the defect this
//! pipeline sees most, so the report carries stream facts the caller
//! can surface as a warning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use trialreel_models::{AudioTrack, Slide};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe;

const CLIP_TIMEOUT_SECS: u64 = 180;
const CONCAT_TIMEOUT_SECS: u64 = 300;
const FADE_SECS: f64 = 0.5;
const MUSIC_VOLUME: f64 = 0.15;

/// Stream facts about the composed video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionReport {
    pub video_path: PathBuf,
    pub has_video: bool,
    /// True only when an audio stream exists and is non-empty.
    pub has_audio: bool,
    pub duration: f64,
}

/// Seam for composing slides and audio into the final video.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Compose `slides` and `tracks` (matched by segment index) into a
    /// video at `output`, optionally mixing in looped background music.
    async fn compose(
        &self,
        slides: &[Slide],
        tracks: &[AudioTrack],
        music: Option<&Path>,
        output: &Path,
    ) -> MediaResult<CompositionReport>;
}

/// FFmpeg-backed implementation of [`VideoEncoder`].
pub struct FfmpegAssembler {
    clip_timeout_secs: u64,
    concat_timeout_secs: u64,
    /// Concurrent clip encodes.
    parallelism: usize,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegAssembler {
    pub fn new() -> Self {
        Self {
            clip_timeout_secs: CLIP_TIMEOUT_SECS,
            concat_timeout_secs: CONCAT_TIMEOUT_SECS,
            parallelism: 2,
        }
    }

    /// Cap concurrent clip encodes.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Set the per-clip FFmpeg timeout.
    pub fn with_clip_timeout(mut self, secs: u64) -> Self {
        self.clip_timeout_secs = secs;
        self
    }

    /// Encode one slide plus its narration into a clip.
    async fn encode_clip(
        &self,
        slide: &Slide,
        track: &AudioTrack,
        clip_path: &Path,
    ) -> MediaResult<()> {
        // The clip must never cut narration short: stretch to the real
        // audio length when it exceeds the planned duration.
        let measured = match probe::audio_duration(&track.path).await {
            Ok(d) => d,
            Err(e) => {
                warn!(
                    "Cannot probe narration {} ({}), using planned duration",
                    track.path.display(),
                    e
                );
                0.0
            }
        };
        let duration = slide.planned_duration.max(measured).max(1.0);

        let cmd = build_clip_command(&slide.path, &track.path, duration, clip_path);
        FfmpegRunner::new()
            .with_timeout(self.clip_timeout_secs)
            .run(&cmd)
            .await?;

        debug!(
            "Encoded clip for segment {} ({:.1}s)",
            slide.segment_index, duration
        );
        Ok(())
    }

    /// Concatenate clips losslessly on the video side.
    async fn concat_clips(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        let list_path = output.with_extension("txt");
        let list = clips.iter().map(|p| concat_entry(p)).collect::<Vec<_>>().join("\n");
        tokio::fs::write(&list_path, list).await?;

        let cmd = FfmpegCommand::new(output)
            .input_with_args(["-f", "concat", "-safe", "0"], list_path.to_string_lossy())
            .output_args(["-c:v", "copy", "-c:a", "aac", "-b:a", "192k", "-ar", "44100"]);

        FfmpegRunner::new()
            .with_timeout(self.concat_timeout_secs)
            .run(&cmd)
            .await
    }

    /// Mix looped background music under the narration.
    async fn mix_music(&self, video: &Path, music: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(output)
            .input(video)
            .input_with_args(["-stream_loop", "-1"], music.to_string_lossy())
            .filter_complex(format!(
                "[1:a]volume={}[a1];[0:a][a1]amix=inputs=2:duration=shortest[aout]",
                MUSIC_VOLUME
            ))
            .output_args(["-map", "0:v", "-map", "[aout]", "-c:v", "copy"])
            .audio_codec("aac")
            .audio_bitrate("192k");

        FfmpegRunner::new()
            .with_timeout(self.concat_timeout_secs)
            .run(&cmd)
            .await
    }
}

#[async_trait]
impl VideoEncoder for FfmpegAssembler {
    async fn compose(
        &self,
        slides: &[Slide],
        tracks: &[AudioTrack],
        music: Option<&Path>,
        output: &Path,
    ) -> MediaResult<CompositionReport> {
        let pairs = pair_tracks(slides, tracks)?;
        info!("Composing {} clips into {}", pairs.len(), output.display());

        let scratch = tempfile::tempdir()?;

        // Encode clips concurrently, bounded by the FFmpeg pool width.
        let pool = Arc::new(Semaphore::new(self.parallelism));
        let futures: Vec<_> = pairs
            .iter()
            .copied()
            .enumerate()
            .map(|(i, (slide, track))| {
                let clip_path = scratch.path().join(format!("clip_{:03}.mp4", i));
                let pool = Arc::clone(&pool);
                async move {
                    let _permit = pool
                        .acquire()
                        .await
                        .map_err(|_| MediaError::internal("FFmpeg pool closed"))?;
                    self.encode_clip(slide, track, &clip_path).await?;
                    Ok::<PathBuf, MediaError>(clip_path)
                }
            })
            .collect();

        let mut clips = Vec::with_capacity(futures.len());
        for result in futures::future::join_all(futures).await {
            clips.push(result?);
        }

        let concatenated = scratch.path().join("concat.mp4");
        self.concat_clips(&clips, &concatenated).await?;

        let finished = match music {
            Some(music) if music.exists() => {
                let with_music = scratch.path().join("with_music.mp4");
                self.mix_music(&concatenated, music, &with_music).await?;
                with_music
            }
            Some(music) => {
                warn!(
                    "Background music {} not found, skipping mix",
                    music.display()
                );
                concatenated
            }
            None => concatenated,
        };

        persist(&finished, output).await?;

        // Post-condition probe. A failed probe reports empty streams so
        // the caller surfaces it instead of trusting the file blindly.
        let report = match probe::probe_media(output).await {
            Ok(streams) => CompositionReport {
                video_path: output.to_path_buf(),
                has_video: streams.has_video,
                has_audio: streams.has_audio && streams.audio_duration > 0.0,
                duration: streams.duration,
            },
            Err(e) => {
                warn!("Cannot probe composed video {} ({})", output.display(), e);
                CompositionReport {
                    video_path: output.to_path_buf(),
                    has_video: false,
                    has_audio: false,
                    duration: 0.0,
                }
            }
        };

        if !report.has_audio {
            warn!("Composed video {} has no usable audio stream", output.display());
        }

        Ok(report)
    }
}

/// Match each slide to its narration track by segment index.
fn pair_tracks<'a>(
    slides: &'a [Slide],
    tracks: &'a [AudioTrack],
) -> MediaResult<Vec<(&'a Slide, &'a AudioTrack)>> {
    if slides.is_empty() {
        return Err(MediaError::InvalidMedia("no slides to compose".to_string()));
    }

    slides
        .iter()
        .map(|slide| {
            tracks
                .iter()
                .find(|t| t.segment_index == slide.segment_index)
                .map(|t| (slide, t))
                .ok_or_else(|| {
                    MediaError::internal(format!(
                        "no audio track for segment {}",
                        slide.segment_index
                    ))
                })
        })
        .collect()
}

/// Still image + narration into a faded clip.
fn build_clip_command(
    slide_path: &Path,
    audio_path: &Path,
    duration: f64,
    output: &Path,
) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .looped_image(slide_path)
        .input(audio_path)
        .video_filter(fade_filter(duration))
        .video_codec("libx264")
        .duration(duration)
        .pixel_format("yuv420p")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-ar", "44100", "-ac", "2"])
}

/// Fade in at the start and out over the last half second.
fn fade_filter(duration: f64) -> String {
    let fade_out_start = (duration - FADE_SECS).max(0.0);
    format!(
        "fade=t=in:st=0:d={},fade=t=out:st={:.2}:d={}",
        FADE_SECS, fade_out_start, FADE_SECS
    )
}

/// One concat demuxer list line, with quotes escaped.
fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{}'", escaped)
}

/// Move a finished file into place, copying across filesystems.
async fn persist(from: &Path, to: &Path) -> MediaResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}
