//! Egress
//!
//! Runs one building emergency simulation and reports who got out.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use egress::messages::IncidentKind;
use egress::navigation::Strategy;
use egress::{Simulation, SimulationConfig, SimulationReport};

/// Building emergency response simulation
#[derive(Parser, Debug)]
#[command(name = "egress")]
#[command(about = "Building emergency response simulation", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of floors
    #[arg(long)]
    floors: Option<usize>,

    /// Rows per floor
    #[arg(long)]
    rows: Option<usize>,

    /// Columns per floor
    #[arg(long)]
    cols: Option<usize>,

    /// Number of occupants
    #[arg(long)]
    occupants: Option<usize>,

    /// Run time in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// RNG seed for the building layout and incidents
    #[arg(long)]
    seed: Option<u64>,

    /// Route planning strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Start with this incident instead of a random one
    #[arg(long, value_enum)]
    incident: Option<IncidentArg>,

    /// Write the final report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the floor plans before starting
    #[arg(long)]
    print_layout: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Optimal,
    Greedy,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Optimal => Strategy::Optimal,
            StrategyArg::Greedy => Strategy::Greedy,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IncidentArg {
    Fire,
    Earthquake,
    GasLeak,
    SecurityThreat,
    CyberAttack,
}

impl From<IncidentArg> for IncidentKind {
    fn from(arg: IncidentArg) -> Self {
        match arg {
            IncidentArg::Fire => IncidentKind::Fire,
            IncidentArg::Earthquake => IncidentKind::Earthquake,
            IncidentArg::GasLeak => IncidentKind::GasLeak,
            IncidentArg::SecurityThreat => IncidentKind::SecurityThreat,
            IncidentArg::CyberAttack => IncidentKind::CyberAttack,
        }
    }
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("egress=info"));
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting egress v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let mut simulation = Simulation::new(config).context("failed to set up simulation")?;
    if let Some(kind) = args.incident {
        simulation = simulation.with_primary(kind.into());
    }

    if args.print_layout {
        let building = simulation.building();
        for floor in 0..building.floors() {
            println!("{}", building.render_floor(floor));
        }
    }

    let report = simulation.run(shutdown_signal()).await?;
    log_summary(&report);

    if let Some(path) = &args.report {
        report
            .write(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    info!("Simulation complete");
    Ok(())
}

/// File, then `EGRESS_*` environment, then command line
fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    config.apply_env()?;

    if let Some(floors) = args.floors {
        config.building.floors = floors;
    }
    if let Some(rows) = args.rows {
        config.building.rows = rows;
    }
    if let Some(cols) = args.cols {
        config.building.cols = cols;
    }
    if let Some(occupants) = args.occupants {
        config.population.occupants = occupants;
    }
    if let Some(duration) = args.duration {
        config.timing.run_duration_secs = duration;
    }
    if let Some(seed) = args.seed {
        config.building.seed = Some(seed);
    }
    if let Some(strategy) = args.strategy {
        config.navigation.strategy = strategy.into();
    }

    config.validate()?;
    Ok(config)
}

fn log_summary(report: &SimulationReport) {
    info!(
        seed = report.seed,
        evacuated = report.evacuated.len(),
        stranded = report.stranded.len(),
        incidents = report.incidents.len(),
        "Run finished"
    );
    for occupant in &report.evacuated {
        info!(
            "  - {} ({:?}) out at {}",
            occupant.id, occupant.mobility, occupant.evacuated_at
        );
    }
    for occupant in &report.stranded {
        warn!(
            "  - {} ({:?}) still inside at {:?}",
            occupant.id, occupant.mobility, occupant.position
        );
    }
    for incident in &report.incidents {
        if incident.stalled {
            error!(
                "  - {} {} at {:?} stalled after {} dispatches",
                incident.id, incident.kind, incident.location, incident.dispatch_attempts
            );
        } else {
            info!(
                "  - {} {} at {:?}: {:?}",
                incident.id, incident.kind, incident.location, incident.status
            );
        }
    }
    info!(
        doors_locked = report.locks.doors_locked,
        elevators_locked = report.locks.elevators_locked,
        communications_locked = report.locks.communications_locked,
        "Final lock state"
    );
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
