//! FFprobe stream inspection.
//!
//! Composition quality hinges on two probes: the narration WAV duration
//! (clip length is the max of the planned duration and the real audio)
//! and the final container's stream layout (a silent final video is the
//! most common field defect, so the assembler checks for a non-empty
//! audio stream after encoding).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Stream-level facts about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    /// Whether a video stream is present
    pub has_video: bool,
    /// Whether an audio stream is present
    pub has_audio: bool,
    /// Duration of the audio stream in seconds (0.0 when absent)
    pub audio_duration: f64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    duration: Option<String>,
}

/// Probe a media file for stream information.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Duration of the audio stream in seconds, 0.0 when the file has none.
pub async fn audio_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_media(path).await?;
    Ok(info.audio_duration)
}

/// Parse FFprobe's `-print_format json` output.
fn parse_probe_output(raw: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let has_video = probe.streams.iter().any(|s| s.codec_type == "video");

    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
    let has_audio = audio_stream.is_some();

    // WAV and MP4 audio streams usually carry their own duration; fall
    // back to the container duration when the stream omits it.
    let audio_duration = audio_stream
        .map(|s| {
            s.duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(duration)
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        size,
        has_video,
        has_audio,
        audio_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_with_audio() {
        let raw = br#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264"},
                {"codec_type": "audio", "codec_name": "aac", "duration": "58.368000"}
            ],
            "format": {"duration": "58.417000", "size": "2048576"}
        }"#;

        let info = parse_probe_output(raw).unwrap();
        assert!(info.has_video);
        assert!(info.has_audio);
        assert!((info.duration - 58.417).abs() < 0.001);
        assert!((info.audio_duration - 58.368).abs() < 0.001);
        assert_eq!(info.size, 2048576);
    }

    #[test]
    fn test_parse_silent_video() {
        let raw = br#"{
            "streams": [{"codec_type": "video"}],
            "format": {"duration": "12.0"}
        }"#;

        let info = parse_probe_output(raw).unwrap();
        assert!(info.has_video);
        assert!(!info.has_audio);
        assert_eq!(info.audio_duration, 0.0);
    }

    #[test]
    fn test_parse_wav_without_stream_duration() {
        let raw = br#"{
            "streams": [{"codec_type": "audio"}],
            "format": {"duration": "7.25", "size": "319'000"}
        }"#;

        // A malformed size field parses to 0 rather than failing.
        let info = parse_probe_output(raw).unwrap();
        assert!(!info.has_video);
        assert!((info.audio_duration - 7.25).abs() < 0.001);
        assert_eq!(info.size, 0);
    }
}
