//! Marketmix: batch attribution and marketing-mix run over a fact bundle.
//!
//! Loads orders, clicks and spend from a JSON file, runs the full pipeline
//! and prints the run result as JSON.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use marketmix_attribution::{AttributionOptions, TouchPath};
use marketmix_core::config::AppConfig;
use marketmix_core::store::InMemoryStore;
use marketmix_reporting::Pipeline;
use std::path::PathBuf;
use tracing::{info, warn};

/// Log filter used when `RUST_LOG` is unset; covers every workspace crate.
const DEFAULT_LOG_FILTER: &str = "marketmix=info,marketmix_core=info,\
    marketmix_attribution=info,marketmix_mmm=info,marketmix_reporting=info";

#[derive(Parser, Debug)]
#[command(name = "marketmix")]
#[command(about = "Revenue attribution and marketing mix modeling over a fact bundle")]
#[command(version)]
struct Cli {
    /// JSON fact bundle with `orders`, `clicks` and `spend`
    #[arg(long, env = "MARKETMIX_FACTS")]
    facts: PathBuf,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the window, inclusive
    #[arg(long)]
    end: NaiveDate,

    /// Run identifier (defaults to a random UUID)
    #[arg(long)]
    run_id: Option<String>,

    /// Total budget to split across channels after the fit
    #[arg(long)]
    budget: Option<f64>,

    /// Optional config file (TOML/JSON/YAML, extension-less name accepted)
    #[arg(long, env = "MARKETMIX_CONFIG")]
    config: Option<String>,

    /// JSON array of observed touch paths for the Markov model
    #[arg(long)]
    session_paths: Option<PathBuf>,

    /// Write the result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.end < cli.start {
        anyhow::bail!("--end {} is before --start {}", cli.end, cli.start);
    }

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let store = InMemoryStore::from_json_file(&cli.facts)
        .with_context(|| format!("loading facts from {}", cli.facts.display()))?;

    let mut options = AttributionOptions::default();
    if let Some(path) = &cli.session_paths {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading session paths from {}", path.display()))?;
        let paths: Vec<TouchPath> = serde_json::from_str(&raw)?;
        info!(paths = paths.len(), "Loaded session paths");
        options.session_paths = Some(paths);
    }

    let run_id = cli
        .run_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(run_id = %run_id, start = %cli.start, end = %cli.end, "Marketmix run starting");

    let result = Pipeline::new(&store, &config)
        .with_options(options)
        .with_budget(cli.budget)
        .run(&run_id, cli.start, cli.end)?;

    let json = serde_json::to_string_pretty(&result)?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing result to {}", path.display()))?;
            info!(path = %path.display(), "Result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
