//! Synthesis seams.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use trialreel_models::SpeechSource;

use crate::error::TtsResult;

/// Narration synthesis as seen by the pipeline.
///
/// `out_stem` is the output path without an extension; the chosen tier
/// appends its own (`.mp3` for remote synthesis, `.wav` otherwise) and
/// the real path comes back with the provenance tag.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        estimated_duration: f64,
        out_stem: &Path,
    ) -> TtsResult<(PathBuf, SpeechSource)>;
}

/// One tier of the synthesis chain.
///
/// Tiers are tried strictly in order and never revisited; a tier that
/// reports itself unavailable is skipped without counting as a failure.
#[async_trait]
pub trait SpeechTier: Send + Sync {
    fn name(&self) -> &'static str;

    fn source(&self) -> SpeechSource;

    /// File extension this tier produces, without the dot.
    fn extension(&self) -> &'static str;

    /// Proactive availability check (credential present, binary on PATH).
    fn available(&self) -> bool;

    async fn run(&self, text: &str, estimated_duration: f64, out: &Path) -> TtsResult<()>;
}
