//! Generative-client error types.

use thiserror::Error;

pub type GenAiResult<T> = Result<T, GenAiError>;

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("Text generation failed: {0}")]
    RequestFailed(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenAiError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn malformed_output(msg: impl Into<String>) -> Self {
        Self::MalformedOutput(msg.into())
    }

    pub fn image_fetch(msg: impl Into<String>) -> Self {
        Self::ImageFetch(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
