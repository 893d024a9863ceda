//! FFmpeg CLI wrapper for slide compositing and video assembly.
//!
//! This crate provides:
//! - Type-safe multi-input FFmpeg command building
//! - FFprobe stream inspection (narration length, silent-output checks)
//! - Slide rasterization with drawtext overlays and blank fallback
//! - Clip encoding, concatenation, and background music mixing
//! - Optional ONNX background removal behind the `bg-removal` feature

pub mod assemble;
#[cfg(feature = "bg-removal")]
pub mod bg_removal;
pub mod command;
pub mod error;
pub mod probe;
pub mod slide;
pub mod text;

pub use assemble::{CompositionReport, FfmpegAssembler, VideoEncoder};
#[cfg(feature = "bg-removal")]
pub use bg_removal::{is_model_configured, BackgroundRemover};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{audio_duration, probe_media, MediaInfo};
pub use slide::{resolve_image, SlideCompositor, SlideRenderer, SLIDE_BACKGROUND, SLIDE_HEIGHT, SLIDE_WIDTH};
pub use text::{escape_drawtext, extract_stats, find_font};
