use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use game_of_life_rows::evolve::evolve_serial_until;
use game_of_life_rows::grid::FullGrid;
use game_of_life_rows::lifecycle::{run_local_group, RunReport};
use game_of_life_rows::signal::{self, ShutdownFlag};
use game_of_life_rows::{logging, InitialState, LifeError, Parameters, RowBoundary, RunConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Every rank is a thread of this process.
    Local,
    /// Every rank is an MPI process; start with mpirun.
    Mpi,
}

/// Game of Life with the grid split row-wise across a group of workers.
#[derive(Debug, Parser)]
#[command(name = "game_of_life_rows", version)]
struct Args {
    /// Number of generations to simulate (positive integer)
    generations: usize,

    /// Size of the NxN grid (positive integer, at most 10000)
    grid_size: usize,

    /// Number of ranks for the local backend
    #[arg(short = 'n', long, env = "LIFE_WORKERS", default_value_t = 1)]
    workers: usize,

    #[arg(long, value_enum, env = "LIFE_BACKEND", default_value_t = Backend::Local)]
    backend: Backend,

    /// Seed for the random initial grid; taken from the clock when omitted
    #[arg(long, env = "LIFE_SEED")]
    seed: Option<u64>,

    /// Probability that a cell starts alive
    #[arg(long, env = "LIFE_DENSITY", default_value_t = 0.5)]
    density: f64,

    /// What lies past the first and last row
    #[arg(long, value_enum, default_value_t = RowBoundary::Toroidal)]
    boundary: RowBoundary,

    /// Log progress every this many generations (0 disables)
    #[arg(long, default_value_t = 10)]
    progress_every: usize,

    /// Print the final grid
    #[arg(long)]
    print_grid: bool,

    /// Re-run the simulation in a single process and compare the grids
    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<LifeError>()
                .map(LifeError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let parameters = Parameters::new(args.generations, args.grid_size)?;
    if !(0.0..=1.0).contains(&args.density) {
        return Err(LifeError::Parameter(format!(
            "density must be between 0 and 1 (got {})",
            args.density
        ))
        .into());
    }
    let seed = args.seed.unwrap_or_else(clock_seed);
    let config = RunConfig::new(parameters)
        .with_initial(InitialState::Random {
            seed,
            density: args.density,
        })
        .with_boundary(args.boundary)
        .with_progress_interval(args.progress_every);

    let shutdown = ShutdownFlag::new();
    signal::spawn_listener(shutdown.clone()).context("failed to install signal handlers")?;

    let report = match args.backend {
        Backend::Local => {
            info!(workers = args.workers, seed, "starting local group");
            Some(run_local_group(args.workers, &config, &shutdown)?)
        }
        Backend::Mpi => run_mpi(&config, &shutdown)?,
    };

    // Only rank 0 has anything to say. The listener has replaced the default Ctrl-C
    // handler, so the flag is checked again before each of the slow steps below.
    if let Some(report) = report {
        println!("{}", report);
        if args.print_grid {
            check_shutdown(&shutdown)?;
            print!("{}", report.grid.render());
        }
        if args.verify {
            check_shutdown(&shutdown)?;
            verify(&report, &config, &shutdown)?;
            println!("Verification: OK");
        }
    }
    Ok(())
}

fn check_shutdown(shutdown: &ShutdownFlag) -> Result<(), LifeError> {
    if shutdown.is_triggered() {
        return Err(LifeError::ExternalSignal);
    }
    Ok(())
}

#[cfg(feature = "mpi")]
fn run_mpi(config: &RunConfig, shutdown: &ShutdownFlag) -> anyhow::Result<Option<RunReport>> {
    use game_of_life_rows::comm::MpiComm;

    // Dropping the universe finalizes MPI on every exit path out of this function.
    let universe = mpi::initialize().context("failed to initialize MPI")?;
    let comm = MpiComm::new(&universe);
    Ok(game_of_life_rows::run_rank(&comm, config, shutdown)?)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_config: &RunConfig, _shutdown: &ShutdownFlag) -> anyhow::Result<Option<RunReport>> {
    bail!("this binary was built without MPI support; rebuild with `--features mpi`")
}

fn verify(report: &RunReport, config: &RunConfig, shutdown: &ShutdownFlag) -> anyhow::Result<()> {
    let initial = match &config.initial {
        InitialState::Random { seed, density } => {
            FullGrid::random(config.parameters.grid_size(), *seed, *density)?
        }
        InitialState::Pattern(pattern) => pattern.clone(),
    };
    let expected = evolve_serial_until(
        &initial,
        config.parameters.generations(),
        config.boundary,
        || shutdown.is_triggered(),
    )?;
    if expected != report.grid {
        bail!(
            "distributed result differs from the single-process run (population {} vs {})",
            report.population,
            expected.population()
        );
    }
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
