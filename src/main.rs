use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agrarian::{
    replicate::{run_replicates, ReplicateOptions},
    scenario::ScenarioLoader,
    LandConstraintMode,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Agropastoral household demography simulator")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/single_household.yaml")]
    scenario: PathBuf,

    /// Override step count (uses scenario default when omitted)
    #[arg(long)]
    steps: Option<u64>,

    /// Number of independent replicates
    #[arg(long, default_value_t = 1)]
    replicates: u32,

    /// Override the base seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the land constraint mode (unlimited, step, asymptote)
    #[arg(long)]
    land_constraint_mode: Option<LandConstraintMode>,

    /// Override snapshot interval in steps
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Write replicate summaries and mean trajectories to this JSON file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Include every replicate's full time series in the output
    #[arg(long)]
    full_series: bool,

    /// Log level for the simulator (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(format!("agrarian={level}")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agrarian=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let loader = ScenarioLoader::new(".");
    let mut scenario = loader.load(&cli.scenario)?;
    if let Some(mode) = cli.land_constraint_mode {
        scenario.parameters.land_constraint_mode = mode;
    }
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }

    let mut options = ReplicateOptions::for_scenario(&scenario, cli.replicates);
    options.steps = scenario.steps(cli.steps);
    options.snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval);
    if let Some(dir) = cli.snapshot_dir {
        options.snapshot_dir = dir;
    }

    let set = run_replicates(&scenario, &options);
    let report = set.report(cli.full_series);
    for (replicate, summary) in &report.summaries {
        println!(
            "replicate {replicate}: final population {}, peak {}, mean food ratio {}",
            summary.final_population,
            summary.peak_population,
            summary
                .mean_food_ratio
                .map(|r| format!("{r:.3}"))
                .unwrap_or_else(|| "n/a".into()),
        );
    }
    if let Some(path) = &cli.output {
        report.write_json(path)?;
        info!(path = %path.display(), "wrote report");
    }

    let failed = report.failures.len();
    if failed > 0 {
        for message in report.failures.values() {
            eprintln!("{message}");
        }
        bail!("{failed} of {} replicates failed", cli.replicates);
    }
    Ok(())
}
