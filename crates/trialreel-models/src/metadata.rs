//! Per-run metadata and error records persisted alongside artifacts.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::{RunId, RunStatus};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Script,
    Assets,
    Images,
    BackgroundRemoval,
    Layout,
    Slides,
    Audio,
    Compose,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Script => "script",
            Stage::Assets => "assets",
            Stage::Images => "images",
            Stage::BackgroundRemoval => "background_removal",
            Stage::Layout => "layout",
            Stage::Slides => "slides",
            Stage::Audio => "audio",
            Stage::Compose => "compose",
        }
    }

    /// Mandatory stages fail the whole run; the rest degrade per item.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            Stage::Script | Stage::Assets | Stage::Layout | Stage::Compose
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wall-clock cost of one completed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

/// How many segments each synthesis tier ended up covering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AudioSourceCounts {
    #[serde(default)]
    pub remote: usize,
    #[serde(default)]
    pub local: usize,
    #[serde(default)]
    pub silent: usize,
}

/// `metadata.json`: the run's summary record, written last on success and
/// with whatever is known on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub trial_id: String,
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    pub duration_target: u32,

    pub segments_count: usize,
    pub assets_count: usize,

    /// Images actually fetched from the synthesis service.
    pub images_count: usize,
    /// Images substituted with the flat-color placeholder.
    pub placeholder_images_count: usize,
    /// Images with a background-removed variant.
    pub background_removed_count: usize,

    pub slides_count: usize,
    /// Slides substituted with a blank frame after a render failure.
    pub blank_slides_count: usize,

    pub audio_sources: AudioSourceCounts,

    /// Per-stage wall-clock timings, in execution order.
    #[serde(default)]
    pub stage_timings: Vec<StageTiming>,

    /// Post-condition anomalies surfaced for operator follow-up.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RunMetadata {
    /// Empty record for a run that just started.
    pub fn new(trial_id: impl Into<String>, run_id: RunId, duration_target: u32) -> Self {
        Self {
            trial_id: trial_id.into(),
            run_id,
            generated_at: Utc::now(),
            status: RunStatus::Error,
            video_path: None,
            duration_target,
            segments_count: 0,
            assets_count: 0,
            images_count: 0,
            placeholder_images_count: 0,
            background_removed_count: 0,
            slides_count: 0,
            blank_slides_count: 0,
            audio_sources: AudioSourceCounts::default(),
            stage_timings: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// `error.json`: written next to the artifacts when a run fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub trial_id: String,
    pub stage: Stage,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,

    /// Stages that finished before the failure.
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
}

impl ErrorRecord {
    pub fn new(
        trial_id: impl Into<String>,
        stage: Stage,
        error: impl Into<String>,
        completed_stages: Vec<Stage>,
    ) -> Self {
        Self {
            trial_id: trial_id.into(),
            stage,
            error: error.into(),
            timestamp: Utc::now(),
            status: RunStatus::Error,
            completed_stages,
        }
    }
}
