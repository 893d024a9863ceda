//! Generative text and image clients for the TrialReel pipeline.
//!
//! This crate provides:
//! - Prompt templates with per-run copies for reproducibility
//! - A Gemini text client with model fallback
//! - Robust parsing of model output into pipeline data types
//! - An image-synthesis client with retry, simplification, and a
//!   placeholder fallback

pub mod error;
pub mod gemini;
pub mod image;
pub mod parse;
pub mod prompts;
pub mod traits;

pub use error::{GenAiError, GenAiResult};
pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_BASE_URL};
pub use image::{
    placeholder_png, FetchedImage, ImageSynthesizer, PollinationsClient, DEFAULT_IMAGE_BASE_URL,
};
pub use prompts::{PromptKind, PromptStore};
pub use traits::{ImageGenerator, TextGenerator};
