//! Error types for run orchestration.

use thiserror::Error;

use trialreel_models::Stage;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while orchestrating a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A mandatory stage failed, or a degradable stage ran out of
    /// fallbacks. Carries the stage so the error record can name it.
    #[error("{stage} stage failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a stage failure error.
    pub fn stage_failed(stage: Stage, message: impl ToString) -> Self {
        Self::StageFailed {
            stage,
            message: message.to_string(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
