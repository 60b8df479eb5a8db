//! aqhub CLI
//!
//! Lists current air-quality readings for the configured regions.

use std::path::PathBuf;

use aqhub::{
    aggregator::Aggregator,
    error::Result,
    models::{AirQualityData, Config},
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// aqhub - Air Quality Aggregator
#[derive(Parser, Debug)]
#[command(
    name = "aqhub",
    version,
    about = "Air-quality readings from Airly, AQICN and GIOŚ"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "aqhub.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch current readings for every configured region
    Stations {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch the current reading of one station (e.g. airly-12345)
    Station {
        id: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete cached provider responses
    ClearCache {
        /// Key prefix to delete (repeatable); all providers when omitted
        #[arg(long = "prefix")]
        prefixes: Vec<String>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Credentials from the environment win over the file.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("AIRLY_API_KEY") {
        config.airly.api_key = Some(key);
    }
    if let Ok(token) = std::env::var("AQICN_TOKEN") {
        config.aqicn.api_key = Some(token);
    }
}

fn print_table(records: &[AirQualityData]) {
    println!("{:<22} {:<32} {:>5}  {}", "ID", "NAME", "AQI", "QUALITY");
    for record in records {
        let index = record.current.primary_index();
        let value = index
            .and_then(|i| i.value)
            .map(|v| format!("{v:.0}"))
            .unwrap_or_else(|| "-".to_string());
        let description = index.map(|i| i.description.as_str()).unwrap_or("brak danych");
        println!(
            "{:<22} {:<32} {:>5}  {}",
            record.source.id, record.source.name, value, description
        );
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    apply_env_overrides(&mut config);
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Stations { json } => {
            let aggregator = Aggregator::from_config(&config)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, finishing current batch...");
                    on_interrupt.cancel();
                }
            });

            let observer = |loaded: usize, total: usize| {
                log::info!("Loaded {}/{} stations", loaded, total);
            };
            let mut records = aggregator.fetch_all_stations_with(&observer, &cancel).await;
            records.sort_by(|a, b| a.source.id.cmp(&b.source.id));

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_table(&records);
            }
        }

        Command::Station { id, json } => {
            let aggregator = Aggregator::from_config(&config)?;
            let Some(record) = aggregator.fetch_station(&id).await else {
                return Err(aqhub::error::AppError::validation(format!(
                    "No data for station {id}"
                )));
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_table(std::slice::from_ref(&record));
                if let Some(history) = &record.historical_data {
                    log::info!("{} historical points available", history.len());
                }
            }
        }

        Command::ClearCache { prefixes } => {
            let aggregator = Aggregator::from_config(&config)?;
            let removed = aggregator.clear_cache(&prefixes).await;
            log::info!("Removed {} cache entries", removed);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            for kind in aqhub::models::ProviderKind::ALL {
                let settings = config.provider(kind);
                log::info!(
                    "✓ {}: {} ({} regions)",
                    kind,
                    if settings.enabled { "enabled" } else { "disabled" },
                    settings.regions.len()
                );
            }

            log::info!("All validations passed!");
        }
    }

    Ok(())
}
