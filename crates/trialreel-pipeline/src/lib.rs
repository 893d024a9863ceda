//! Run orchestration for the TrialReel pipeline.
//!
//! This crate provides:
//! - The seven-stage orchestrator driving a run end to end
//! - Run directory layout and artifact persistence
//! - Environment-backed pipeline configuration
//! - The service seams scenario tests stub out
//! - Structured run logging

pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod runfs;
pub mod services;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::{init_tracing, RunLogger};
pub use orchestrator::Pipeline;
pub use runfs::RunPaths;
pub use services::{BackgroundStage, PipelineServices};
