use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetwatch::config::FleetwatchConfig;
use fleetwatch::validate::{parse_time_range, validate_identifier};

/// Operator tooling for the Fleetwatch governance layer.
#[derive(Debug, Parser)]
#[command(name = "fleetwatch", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate the configuration, then print the effective values
    CheckConfig,

    /// Check a cluster or service identifier against the input rules
    ValidateId {
        identifier: String,

        /// Overrides the configured maximum length
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Check an RFC 3339 time range against the query rules
    ValidateRange { start: String, end: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Fleetwatch {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::CheckConfig => {
            println!("{}", config.to_yaml()?);
            info!(
                allowed_targets = config.validation.allowed_targets.len(),
                "Configuration is valid"
            );
        }
        Command::ValidateId {
            identifier,
            max_length,
        } => {
            let max_length = max_length.unwrap_or(config.validation.max_identifier_length);
            match validate_identifier(&identifier, max_length) {
                Ok(()) => println!("ok"),
                Err(err) => bail!("invalid identifier: {}", err),
            }
        }
        Command::ValidateRange { start, end } => match parse_time_range(&start, &end, Utc::now()) {
            Ok(range) => println!(
                "ok: {:.1} hours, metric period {}s",
                range.duration_hours(),
                range.metric_period_secs()
            ),
            Err(err) => bail!("invalid time range: {}", err),
        },
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<FleetwatchConfig> {
    match path {
        Some(path) => FleetwatchConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => {
            warn!("No configuration file given, using defaults");
            let config = FleetwatchConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
