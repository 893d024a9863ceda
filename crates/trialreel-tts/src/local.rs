//! Offline synthesis tiers: espeak subprocess and silent WAV.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use trialreel_models::SpeechSource;

use crate::error::{TtsError, TtsResult};
use crate::traits::SpeechTier;

/// Binaries probed for local synthesis, in preference order.
const ESPEAK_BINARIES: &[&str] = &["espeak-ng", "espeak"];

/// Words per minute for espeak output.
const SPEECH_RATE_WPM: u32 = 150;

/// Sample rate of generated silent tracks.
pub const SILENT_SAMPLE_RATE: u32 = 22050;

/// Local tier driving an espeak binary.
pub struct EspeakTier {
    binary: Option<PathBuf>,
}

impl Default for EspeakTier {
    fn default() -> Self {
        Self::discover()
    }
}

impl EspeakTier {
    /// Look for an espeak binary on PATH.
    pub fn discover() -> Self {
        let binary = ESPEAK_BINARIES.iter().find_map(|b| which::which(b).ok());
        if let Some(ref path) = binary {
            debug!("Found local TTS binary at {}", path.display());
        }
        Self { binary }
    }

    /// Use a specific binary (tests).
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }
}

#[async_trait]
impl SpeechTier for EspeakTier {
    fn name(&self) -> &'static str {
        "espeak"
    }

    fn source(&self) -> SpeechSource {
        SpeechSource::Local
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn available(&self) -> bool {
        self.binary.is_some()
    }

    async fn run(&self, text: &str, _estimated_duration: f64, out: &Path) -> TtsResult<()> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| TtsError::unavailable("no espeak binary on PATH"))?;

        let status = Command::new(binary)
            .arg("-s")
            .arg(SPEECH_RATE_WPM.to_string())
            .arg("-w")
            .arg(out)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(TtsError::engine_failed(format!(
                "espeak exited with status {:?}",
                status.code()
            )));
        }
        Ok(())
    }
}

/// Last-resort tier writing silence of the narration's estimated length.
///
/// This keeps the assembler fed with a track of the right duration even
/// when no synthesis backend exists on the machine.
pub struct SilentTier;

#[async_trait]
impl SpeechTier for SilentTier {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn source(&self) -> SpeechSource {
        SpeechSource::Silent
    }

    fn extension(&self) -> &'static str {
        "wav"
    }

    fn available(&self) -> bool {
        true
    }

    async fn run(&self, _text: &str, estimated_duration: f64, out: &Path) -> TtsResult<()> {
        write_silent_wav(out, estimated_duration)
    }
}

/// Write a 16-bit mono WAV of zeros, at least one second long.
pub fn write_silent_wav(path: &Path, duration_secs: f64) -> TtsResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SILENT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let samples = (duration_secs.max(1.0) * SILENT_SAMPLE_RATE as f64).round() as usize;
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}
