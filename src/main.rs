// Allow dead code for library items that are part of the API surface but not
// used by every binary code path
#![allow(dead_code)]

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod attachment;
mod cache;
mod classifier;
mod cli;
mod config;
mod dedup;
mod export;
mod extraction;
mod ingest;
mod merge;
mod orchestrator;
mod pipeline;
mod submission;

use cli::Cli;
use config::AppConfig;
use pipeline::PipelineOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if cli.init {
        let path = AppConfig::create_default_config()?;
        println!("Created default configuration at {}", path.display());
        return Ok(());
    }

    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(config::ConfigError::FileNotFound(path)) => {
            eprintln!("Configuration file not found at {}", path.display());
            match AppConfig::prompt_create_config()? {
                Some(created) => {
                    println!("Created default configuration at {}", created.display());
                    AppConfig::load()?
                }
                None => bail!(
                    "No configuration available. Run 'commentlens --init' to create one."
                ),
            }
        }
        Err(e) => return Err(e.into()),
    };

    // CLI overrides are a thin pass-through onto the config
    if let Some(model) = &cli.model {
        config.classifier.model = model.clone();
    }
    if let Some(workers) = cli.workers {
        config.analysis.max_workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.analysis.batch_size = batch_size;
    }
    config.validate()?;

    let output_format = cli.output_format.to_lowercase();
    if output_format != "json" && output_format != "csv" {
        bail!("Unsupported output format '{}'. Expected 'json' or 'csv'.", cli.output_format);
    }

    let options = PipelineOptions {
        csv_path: cli.csv.clone(),
        limit: cli.limit,
        sample: cli.sample,
        truncate_chars: cli.truncate,
        parallel: !cli.no_parallel,
        use_vision: cli.use_vision,
    };

    let (merged, summary) = pipeline::run(&config, &options).await?;

    let output_path = format!("{}.{}", cli.output, output_format);
    match output_format.as_str() {
        "csv" => export::export_csv(&merged, &output_path)?,
        _ => export::export_json(&merged, &summary, &output_path)?,
    }
    info!("Results written to {}", output_path);

    pipeline::print_summary(&summary);
    println!("Results saved to: {output_path}");

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "commentlens=info",
        1 => "commentlens=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
