//! Synthesized narration audio with provenance.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which synthesis tier produced a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechSource {
    /// Primary remote text-to-speech service.
    Remote,
    /// Local offline synthesizer.
    Local,
    /// Generated silence matching the estimated duration.
    Silent,
}

impl SpeechSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechSource::Remote => "remote",
            SpeechSource::Local => "local",
            SpeechSource::Silent => "silent",
        }
    }
}

/// Narration waveform for one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    pub segment_index: usize,

    /// Waveform location inside the run directory.
    pub path: PathBuf,

    /// Tier that produced the waveform.
    pub source: SpeechSource,

    /// Narration duration estimate the silent tier would match, seconds.
    pub estimated_duration: f64,
}
