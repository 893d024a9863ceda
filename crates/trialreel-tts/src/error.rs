//! Error types for narration synthesis.

use thiserror::Error;

/// Result type for synthesis operations.
pub type TtsResult<T> = Result<T, TtsError>;

/// Errors that can occur while synthesizing narration.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("TTS request failed: {0}")]
    RequestFailed(String),

    #[error("TTS engine failed: {0}")]
    EngineFailed(String),

    #[error("Tier unavailable: {0}")]
    Unavailable(String),

    #[error("All synthesis tiers failed")]
    Exhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl TtsError {
    /// Create a request failure error.
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }

    /// Create an engine failure error.
    pub fn engine_failed(message: impl Into<String>) -> Self {
        Self::EngineFailed(message.into())
    }

    /// Create a tier unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
