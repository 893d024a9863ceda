//! Service seams for the generation stages.
//!
//! Orchestration code works against these traits so tests can substitute
//! canned implementations for the remote services.

use async_trait::async_trait;

use crate::error::GenAiResult;

/// A text-generation service: prompt in, raw model text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GenAiResult<String>;
}

/// A text-to-image service: prompt in, encoded image bytes out.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn fetch_image(&self, prompt: &str) -> GenAiResult<Vec<u8>>;
}
