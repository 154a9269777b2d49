//! `datagate` — run the external-dataset admission pipeline.
//!
//! # Usage
//!
//! ```
//! datagate --config config.yaml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use datagate::{run_pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "datagate", about = "External-dataset admission control pipeline")]
struct Args {
    /// Path to the YAML pipeline configuration.
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let summary = run_pipeline(&config).await?;
    tracing::info!(
        "run complete: {} fact rows, {} recommended, {} ledger entries, {} used, {} blocked",
        summary.fact_rows,
        summary.datasets_recommended,
        summary.ledger_entries,
        summary.datasets_used,
        summary.datasets_blocked
    );
    Ok(())
}
