use clap::Parser;
use log::{error, info, warn, LevelFilter};

mod aggregate;
mod config;
mod datatypes;
mod error;
mod filter;
mod input;
mod kmeans;
mod post_processor;
mod quality;
mod selector;
mod stats;
mod transform;
mod variability;
mod workflow;

use error::GaugeError;
use workflow::{Orchestrator, RunOutcome};

/// Selects strain gauge locations from a nodal FE strain field
#[derive(Parser, Debug)]
#[command(name = "gaugeplace", version, about, long_about = None)]
struct Cli {
    /// Placement configuration json
    config: String,

    /// Strain field csv files; load cases are merged in the given order
    #[arg(required = true)]
    strain_files: Vec<String>,

    /// Candidate table output
    #[arg(short, long, default_value = "candidates.csv")]
    output: String,

    /// Clustering preview output
    #[arg(long, default_value = "preview.csv")]
    preview_output: String,

    /// Continue past the K-Means clustering preview
    #[arg(long = "continue")]
    is_continued: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let log_level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::new().filter_level(log_level).init();
}

fn run(cli: &Cli) -> Result<(), GaugeError> {
    let config_json = config::load_config_file(&cli.config)?;
    let placement_config = config::parse_placement_config(&config_json)?;
    let unit = config::parse_strain_unit(&config_json)?;

    let datasets = cli
        .strain_files
        .iter()
        .map(|f| input::read_strain_csv(f, unit))
        .collect::<Result<Vec<_>, _>>()?;

    let mut orchestrator = Orchestrator::new();
    match orchestrator.run(&datasets, &placement_config, cli.is_continued)? {
        RunOutcome::Preview { nodes, labels } => {
            post_processor::preview_output(&nodes, &labels, &cli.preview_output)?;
            info!("review the clustering preview, then re-run with --continue to select candidates");
        }
        RunOutcome::Complete { candidates } => {
            if candidates.is_empty() {
                warn!("no candidates satisfy the configuration");
            }
            post_processor::csv_output(&candidates, &cli.output)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1)
    }
}
