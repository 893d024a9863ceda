//! Structured run logging utilities.
//!
//! Provides consistent, structured logging for run lifecycle events
//! with the trial and run identifiers attached, so concurrent runs
//! stay distinguishable in aggregated logs.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trialreel_models::{RunId, Stage};

/// Initialize tracing for the binary.
///
/// Human-readable output by default; `LOG_FORMAT=json` switches to JSON
/// for aggregated logs. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("trialreel=info".parse().expect("static directive"))
        .add_directive("ort=warn".parse().expect("static directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    trial_id: String,
    run_id: String,
}

impl RunLogger {
    /// Create a new run logger for one trial's run.
    pub fn new(trial_id: &str, run_id: &RunId) -> Self {
        Self {
            trial_id: trial_id.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Log the start of a run.
    pub fn log_start(&self, message: &str) {
        info!(
            trial_id = %self.trial_id,
            run_id = %self.run_id,
            "Run started: {}", message
        );
    }

    /// Log a stage lifecycle event.
    pub fn log_stage(&self, stage: Stage, message: &str) {
        info!(
            trial_id = %self.trial_id,
            run_id = %self.run_id,
            stage = %stage,
            "{}", message
        );
    }

    /// Log a warning during run execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            trial_id = %self.trial_id,
            run_id = %self.run_id,
            "Run warning: {}", message
        );
    }

    /// Log an error during run execution.
    pub fn log_error(&self, message: &str) {
        error!(
            trial_id = %self.trial_id,
            run_id = %self.run_id,
            "Run error: {}", message
        );
    }

    /// Log the completion of a run.
    pub fn log_completion(&self, message: &str) {
        info!(
            trial_id = %self.trial_id,
            run_id = %self.run_id,
            "Run completed: {}", message
        );
    }

    /// Get the trial ID.
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the run ID.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_accessors() {
        let run_id = RunId::from_string("20250314_092653");
        let logger = RunLogger::new("NCT01234567", &run_id);

        assert_eq!(logger.trial_id(), "NCT01234567");
        assert_eq!(logger.run_id(), "20250314_092653");
    }
}
