//! Runs the dynamic medium state iteration on a demo model: a cube of
//! destructible dust and free electrons around a central point source.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use radmedium::sim::comm::{LocalComm, ProcessComm, ThreadGroupComm};
use radmedium::sim::dynamic::{
    DustDestructionRecipe, DynamicStateDriver, EquilibriumTemperatureRecipe, IterationOutcome,
    PointSourceSampler,
};
use radmedium::sim::grid::CartesianGrid;
use radmedium::sim::materials::{DestructibleDustMix, ElectronMix, MixRegistry, PowerLawDustMix};
use radmedium::sim::medium::{Medium, UniformMedium};
use radmedium::{MediumSystem, Point, SimulationConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug, Clone)]
#[command(name = "radmedium")]
#[command(about = "Iterate the dynamic medium state of a dusty cube around a point source")]
struct Cli {
    /// Simulation config (JSON). Defaults are used for missing fields.
    config: Option<PathBuf>,

    /// Half size of the cube [m]
    #[arg(long, default_value = "1e15")]
    half_size: f64,

    /// Number of cells per axis
    #[arg(long, default_value = "8")]
    cells: usize,

    /// Source luminosity [W]
    #[arg(long, default_value = "3.8e30")]
    luminosity: f64,

    /// Dust number density [1/m^3]
    #[arg(long, default_value = "1e10")]
    dust_density: f64,

    /// Electron number density [1/m^3]
    #[arg(long, default_value = "1e11")]
    electron_density: f64,

    /// Radiation energy density where dust destruction starts [J/m^3]
    #[arg(long, default_value = "1e-10")]
    destruction_start: f64,

    /// Radiation energy density where all dust is destroyed [J/m^3]
    #[arg(long, default_value = "1e-8")]
    destruction_end: f64,

    /// Number of cooperating ranks, each running on its own thread
    #[arg(long, default_value = "1")]
    ranks: usize,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn build_system(cli: &Cli, config: SimulationConfig, comm: Arc<dyn ProcessComm>) -> Result<MediumSystem> {
    let grid = CartesianGrid::cube(cli.half_size, cli.cells)?;

    let mut mixes = MixRegistry::new();
    let dust = mixes.register(DestructibleDustMix::new(PowerLawDustMix::interstellar(
        "destructible dust",
    )));
    let electrons = mixes.register(ElectronMix);

    let media: Vec<Box<dyn Medium>> = vec![
        Box::new(UniformMedium::new("dust", cli.dust_density, dust)),
        Box::new(UniformMedium::new("electrons", cli.electron_density, electrons)),
    ];
    let system = MediumSystem::new(config, Arc::new(grid), media, mixes, comm)?;
    Ok(system)
}

fn run_rank(cli: &Cli, config: SimulationConfig, comm: Arc<dyn ProcessComm>) -> Result<IterationOutcome> {
    let wlg = config.radiation_field_wlg()?;
    let mut system = build_system(cli, config, comm)?;
    let mut sampler = PointSourceSampler::new(Point::origin(), cli.luminosity, wlg);
    let mut driver = DynamicStateDriver::new()
        .with_recipe(DustDestructionRecipe::new(
            cli.destruction_start,
            cli.destruction_end,
        ))
        .with_recipe(EquilibriumTemperatureRecipe::new(0.01));
    driver.run(&mut system, &mut sampler)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radmedium=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::new(),
    };
    if cli.print_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    let outcome = if cli.ranks <= 1 {
        run_rank(&cli, config, Arc::new(LocalComm))?
    } else {
        info!(ranks = cli.ranks, "running ranks on separate threads");
        let outcomes: Vec<Result<IterationOutcome>> = thread::scope(|scope| {
            let handles: Vec<_> = ThreadGroupComm::group(cli.ranks)
                .into_iter()
                .map(|comm| {
                    let cli = &cli;
                    let config = config.clone();
                    scope.spawn(move || run_rank(cli, config, Arc::new(comm)))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().map_err(|_| anyhow!("rank thread panicked"))?)
                .collect()
        });
        let mut outcomes = outcomes.into_iter();
        let first = outcomes.next().context("no ranks were run")??;
        for other in outcomes {
            other?;
        }
        first
    };

    info!(
        iterations = outcome.iterations,
        termination = ?outcome.termination,
        "dynamic medium state iteration finished"
    );
    for step in &outcome.history {
        info!(
            iteration = step.iteration,
            num_updated = ?step.num_updated,
            converged = ?step.converged,
            "step summary"
        );
    }
    Ok(())
}
