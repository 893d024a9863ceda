//! TrialReel generation binary.
//!
//! Reads a patient-friendly summary from a file and runs the full
//! pipeline, printing the outcome record as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use trialreel_models::GenerationRequest;
use trialreel_pipeline::{init_tracing, Pipeline, PipelineConfig, PipelineServices};

#[derive(Debug, Parser)]
#[command(name = "trialreel", about = "Generate a narrated trial video from a summary")]
struct Args {
    /// Plain-text summary file to narrate
    #[arg(long)]
    summary: PathBuf,

    /// Trial identifier scoping the run directory
    #[arg(long)]
    trial_id: String,

    /// Rough target video length in seconds
    #[arg(long, default_value_t = 60)]
    duration: u32,

    /// Optional background music mixed under the narration
    #[arg(long)]
    music: Option<PathBuf>,

    /// Directory under which run directories are created
    #[arg(long)]
    run_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let summary = std::fs::read_to_string(&args.summary)
        .with_context(|| format!("cannot read summary file {}", args.summary.display()))?;

    let mut config = PipelineConfig::from_env();
    if let Some(run_root) = args.run_root {
        config.run_root = run_root;
    }
    info!(
        "Starting trialreel (run root {}, image endpoint {})",
        config.run_root.display(),
        config.image_base_url
    );

    let services = PipelineServices::from_env(&config).context("service setup failed")?;
    let pipeline = Pipeline::new(config, services).context("pipeline setup failed")?;

    let mut request = GenerationRequest::new(args.trial_id, summary)
        .with_target_duration(args.duration);
    if let Some(music) = args.music {
        request = request.with_music(music);
    }

    let outcome = pipeline.run(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        if let Some(record) = &outcome.error {
            error!("Run failed in {} stage: {}", record.stage, record.error);
        }
        std::process::exit(1);
    }
    Ok(())
}
