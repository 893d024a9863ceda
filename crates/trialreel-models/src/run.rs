//! Run identity and the request/outcome boundary records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::{ErrorRecord, RunMetadata};

/// Timestamp-derived identifier for one pipeline run.
///
/// Doubles as the run directory name under `<run_root>/<trial_id>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    const FORMAT: &'static str = "%Y%m%d_%H%M%S";

    /// Id for a run starting now.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Id for a run at a fixed instant. Tests use this for deterministic
    /// directory layouts.
    pub fn at(ts: DateTime<Utc>) -> Self {
        Self(ts.format(Self::FORMAT).to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Variant with a short random suffix, for the second run landing on
    /// the same timestamp.
    pub fn disambiguated(&self) -> Self {
        let tag = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", self.0, &tag[..4]))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input record handed to the pipeline by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Trial identifier; scopes the run directory.
    pub trial_id: String,

    /// Plain-text patient-friendly summary to narrate.
    pub summary_text: String,

    /// Rough overall video length the script should aim for.
    #[serde(default = "default_target_duration")]
    pub target_duration_seconds: u32,

    /// Optional background music mixed under the narration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_music: Option<PathBuf>,
}

fn default_target_duration() -> u32 {
    60
}

impl GenerationRequest {
    pub fn new(trial_id: impl Into<String>, summary_text: impl Into<String>) -> Self {
        Self {
            trial_id: trial_id.into(),
            summary_text: summary_text.into(),
            target_duration_seconds: default_target_duration(),
            background_music: None,
        }
    }

    pub fn with_target_duration(mut self, seconds: u32) -> Self {
        self.target_duration_seconds = seconds;
        self
    }

    pub fn with_music(mut self, path: impl Into<PathBuf>) -> Self {
        self.background_music = Some(path.into());
        self
    }
}

/// Paths to the persisted stage outputs a caller may want to inspect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntermediatePaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<PathBuf>,
}

/// Terminal record returned to the caller.
///
/// Present even on failure: partial runs keep their artifacts, and the
/// outcome points at whatever exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub status: RunStatus,

    /// Run directory holding all artifacts.
    pub run_dir: PathBuf,

    /// Final video, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,

    /// Counts and timings, present once stage 1 has started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,

    pub intermediate_output_paths: IntermediatePaths,

    /// Failure detail, present only on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
