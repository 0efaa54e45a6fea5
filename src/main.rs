// main.rs - Command-line entry point for dataset preparation

use anyhow::Result;
use clap::Parser;
use quadprep::cli::Cli;
use quadprep::Pipeline;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes priority over --log-level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    let config = cli.into_config()?;
    let summary = Pipeline::new(config)?.run()?;

    println!(
        "Finished processing the dataset. Total number of samples: {}",
        summary.start_index + summary.samples
    );
    Ok(())
}
