/// Command-line entry point: `train` runs the pipeline, `predict` answers one query
use clap::{Parser, Subcommand};
use flight_delay::config::{HistoryScope, PipelineConfig};
use flight_delay::inference::{FlightDelayPredictor, DEFAULT_ARR_FLIGHTS};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flight_delay")]
#[command(about = "Train and serve flight delay-rate models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train all models, keep the best, write artifacts and reports
    Train {
        /// TOML config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Source CSV
        #[arg(long)]
        data: Option<PathBuf>,

        /// Artifact output directory
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Report output directory
        #[arg(long)]
        reports: Option<PathBuf>,

        /// Compute historical rates from training years only
        #[arg(long)]
        training_only_history: bool,
    },

    /// Predict the delay rate for one carrier, airport and month
    Predict {
        /// Carrier code, e.g. AA
        carrier: String,

        /// Airport code, e.g. ORD
        airport: String,

        /// Month, 1-12
        month: u32,

        /// Assumed arriving flights, used when the combination was never seen
        #[arg(long, default_value_t = DEFAULT_ARR_FLIGHTS)]
        flights: u32,

        /// Artifact directory written by `train`
        #[arg(long, default_value = "models")]
        artifacts: PathBuf,
    },
}

/// parse CLI, set up logging, and dispatch
/// input: command-line arguments, RUST_LOG
/// output: exit code (failure when the command errors)
/// logic: install a stderr tracing subscriber (default level info); run the subcommand;
/// log the error and exit non-zero if it fails
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Train { config, data, artifacts, reports, training_only_history } => {
            cmd_train(config.as_deref(), data, artifacts, reports, training_only_history)
        }
        Commands::Predict { carrier, airport, month, flights, artifacts } => {
            cmd_predict(&artifacts, &carrier, &airport, month, flights)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn cmd_train(
    config_path: Option<&Path>,
    data: Option<PathBuf>,
    artifacts: Option<PathBuf>,
    reports: Option<PathBuf>,
    training_only_history: bool,
) -> flight_delay::Result<()> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(data) = data {
        config.data_path = data;
    }
    if let Some(artifacts) = artifacts {
        config.artifacts_dir = artifacts;
    }
    if let Some(reports) = reports {
        config.reports_dir = reports;
    }
    if training_only_history {
        config.history_scope = HistoryScope::TrainingOnly;
    }

    let summary = flight_delay::run(&config)?;
    println!("{summary}");
    Ok(())
}

fn cmd_predict(artifacts: &Path, carrier: &str, airport: &str, month: u32, flights: u32) -> flight_delay::Result<()> {
    let predictor = FlightDelayPredictor::load(artifacts)?;
    let prediction = predictor.predict(carrier, airport, month, flights)?;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
