//! Shared data models for the TrialReel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Narration scripts and their segments
//! - Planned visual assets and generated images
//! - Slide layout plans and rasterized slides
//! - Synthesized audio tracks with provenance
//! - Runs, metadata records, and error records

pub mod asset;
pub mod audio;
pub mod metadata;
pub mod run;
pub mod script;
pub mod slide;

// Re-export common types
pub use asset::{AssetCategory, AssetId, AssetSpec, GeneratedImage};
pub use audio::{AudioTrack, SpeechSource};
pub use metadata::{AudioSourceCounts, ErrorRecord, RunMetadata, Stage, StageTiming};
pub use run::{GenerationRequest, GenerationOutcome, IntermediatePaths, RunId, RunStatus};
pub use script::{Script, ScriptValidation, Segment};
pub use slide::{ImagePlacement, Slide, SlideLayout, SlidePlan};
