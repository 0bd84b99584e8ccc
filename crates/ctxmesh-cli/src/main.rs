#![deny(unsafe_code)]

//! ctxmesh CLI: inspect configuration and run a config-driven mesh.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ctxmesh_config::AppConfig;
use ctxmesh_core::{Aggregator, ContextInformationList, Discoverer, Role, Widget, storage};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// ctxmesh, a context-information mesh of widgets, interpreters and aggregators.
#[derive(Parser)]
#[command(name = "ctxmesh", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "ctxmesh.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// List the configured translations.
    Translations,

    /// Wire the configured widgets into the configured aggregator and refresh it.
    Simulate {
        /// How many refresh rounds to run.
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Translations => cmd_translations(&config),
        Commands::Simulate { rounds } => {
            let report = simulate(&config, rounds).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

fn cmd_translations(config: &AppConfig) {
    let discoverer = Discoverer::from_config(config);
    let translations = discoverer.translations();
    if translations.is_empty() {
        println!("No translations configured.");
    }
    for translation in translations {
        println!("{} <-> {}", translation.from(), translation.to());
    }
}

/// Build the configured mesh, refresh the aggregator `rounds` times and
/// report what it ended up with.
async fn simulate(config: &AppConfig, rounds: u32) -> Result<serde_json::Value> {
    let discoverer = Discoverer::from_config(config);
    let widgets: Vec<_> = config
        .widgets
        .iter()
        .map(|w| Widget::from_config(&discoverer, w))
        .collect();
    let backend = storage::from_config(&config.storage).context("failed to open storage")?;

    let desired: ContextInformationList = config
        .aggregator
        .desired
        .iter()
        .map(|k| discoverer.build_from_config(k))
        .collect();
    let aggregator = Aggregator::new(&discoverer, &config.aggregator.name, desired, backend);
    info!(
        widgets = widgets.len(),
        attached = aggregator.attached_component_ids().len(),
        rounds,
        "Simulating"
    );

    for _ in 0..rounds {
        aggregator.query_referenced_components().await?;
    }

    Ok(json!({
        "aggregator": aggregator.name(),
        "components": discoverer.descriptions(&Role::ALL),
        "current_data": aggregator.current_data(),
        "unsatisfied": aggregator.unsatisfied(),
        "stored": aggregator.stored_names().await?,
    }))
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load '{}'", path.display()))
    } else {
        Ok(AppConfig::default())
    }
}
