//! Per-rank run: distribute, the generation loop, gather, and teardown on every exit path.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn};

use crate::comm::{Comm, LocalGroup};
use crate::error::{LifeError, Result};
use crate::evolve;
use crate::grid::{FullGrid, LocalGrid};
use crate::halo;
use crate::params::{InitialState, RunConfig};
use crate::partition::Partition;
use crate::scatter::{self, ROOT};
use crate::signal::ShutdownFlag;

/// The two generation buffers of a worker. `active` holds the current generation; the
/// other one is scratch for the next.
#[derive(Debug)]
pub struct DoubleBuffer {
    buffers: [LocalGrid; 2],
    active: usize,
}

impl DoubleBuffer {
    /// Takes `initial` as the current generation and allocates a matching scratch buffer.
    pub fn new(initial: LocalGrid) -> Result<Self> {
        let scratch = LocalGrid::new(initial.local_rows(), initial.grid_size())?;
        Ok(DoubleBuffer {
            buffers: [initial, scratch],
            active: 0,
        })
    }

    pub fn active(&self) -> &LocalGrid {
        &self.buffers[self.active]
    }

    pub fn active_mut(&mut self) -> &mut LocalGrid {
        &mut self.buffers[self.active]
    }

    /// `(current, next)`.
    pub fn split(&mut self) -> (&LocalGrid, &mut LocalGrid) {
        let [a, b] = &mut self.buffers;
        if self.active == 0 {
            (&*a, b)
        } else {
            (&*b, a)
        }
    }

    /// Makes the scratch buffer current. No cells are copied.
    pub fn swap(&mut self) {
        self.active ^= 1;
    }

    fn zeroize(&mut self) {
        for buffer in &mut self.buffers {
            buffer.matrix_mut().zeroize();
        }
    }
}

/// Everything a rank allocates for a run.
///
/// `release` zeroes and frees the buffers. It may be called any number of times from any
/// exit path and only does work once; `Drop` calls it as a last resort.
#[derive(Debug)]
pub struct WorkerResources {
    rank: usize,
    buffers: Option<DoubleBuffer>,
    full: Option<FullGrid>,
    released: bool,
}

impl WorkerResources {
    pub fn new(rank: usize) -> Self {
        WorkerResources {
            rank,
            buffers: None,
            full: None,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(mut buffers) = self.buffers.take() {
            buffers.zeroize();
        }
        if let Some(mut full) = self.full.take() {
            full.matrix_mut().zeroize();
        }
        debug!(rank = self.rank, "released grid buffers");
    }
}

impl Drop for WorkerResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// What rank 0 hands back after a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub grid: FullGrid,
    pub generations: usize,
    pub population: u64,
    /// Wall time between the start and stop barriers.
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generation: {}", self.generations)?;
        writeln!(f, "Population: {}", self.population)?;
        write!(f, "Time taken: {:.4} seconds", self.elapsed.as_secs_f64())
    }
}

/// Runs one rank's share of a simulation.
///
/// Rank 0 returns `Some(report)`, every other rank `None`. Errors that leave the group in
/// an inconsistent state abort the whole group before they are returned.
pub fn run_rank<C: Comm + ?Sized>(
    comm: &C,
    config: &RunConfig,
    shutdown: &ShutdownFlag,
) -> Result<Option<RunReport>> {
    let rank = comm.rank();
    let span = info_span!("rank", rank);
    let _enter = span.enter();

    // Local checks only: nothing has been allocated or sent yet.
    let grid_size = config.parameters.grid_size();
    let partition = Partition::new(grid_size, comm.size())?;
    if let InitialState::Pattern(pattern) = &config.initial {
        if pattern.size() != grid_size {
            return Err(LifeError::Parameter(format!(
                "initial pattern is {}x{}, expected {}x{}",
                pattern.size(),
                pattern.size(),
                grid_size,
                grid_size
            )));
        }
    }

    let mut resources = WorkerResources::new(rank);
    let result = drive(comm, config, &partition, shutdown, &mut resources);

    // Whoever fails first takes the group down. A rank that was itself aborted only
    // reports it; aborting again would claim the failure for the wrong rank.
    if let Err(e) = &result {
        match e {
            LifeError::Aborted { origin } => warn!(origin, "run aborted by another rank"),
            e if e.requires_group_abort() => comm.abort(e),
            e => warn!(error = %e, "run failed"),
        }
    }
    resources.release();
    result
}

fn drive<C: Comm + ?Sized>(
    comm: &C,
    config: &RunConfig,
    partition: &Partition,
    shutdown: &ShutdownFlag,
    resources: &mut WorkerResources,
) -> Result<Option<RunReport>> {
    let rank: usize = comm.rank();
    let generations: usize = config.parameters.generations();
    let grid_size: usize = config.parameters.grid_size();

    // Only rank 0 ever holds the full board. It keeps it in `resources` so the same
    // allocation can be reused as the gather target.
    let own = if rank == ROOT {
        let full = match &config.initial {
            InitialState::Random { seed, density } => FullGrid::random(grid_size, *seed, *density)?,
            InitialState::Pattern(pattern) => pattern.clone(),
        };
        let full = resources.full.insert(full);
        scatter::distribute(comm, full, partition)?
    } else {
        scatter::receive_block(comm, partition)?
    };
    let buffers = resources.buffers.insert(DoubleBuffer::new(own)?);
    info!(rows = partition.rows(rank), offset = partition.offset(rank), "block ready");

    // Everybody has their block before the clock starts.
    comm.barrier()?;
    let start = Instant::now();

    for generation in 0..generations {
        // Between generations is the only place a rank stops on its own.
        if shutdown.is_triggered() {
            return Err(LifeError::ExternalSignal);
        }
        if let Some(origin) = comm.aborted_by() {
            return Err(LifeError::Aborted { origin });
        }

        // Ghost rows first, then the step reads them and writes only the other buffer.
        halo::exchange(comm, buffers.active_mut(), config.boundary)?;
        let (current, next) = buffers.split();
        evolve::step(current, next);
        buffers.swap();

        let done = generation + 1;
        if rank == ROOT
            && config.progress_interval > 0
            && (done % config.progress_interval == 0 || done == generations)
        {
            info!(
                generation = done,
                total = generations,
                percent = done as f64 * 100.0 / generations as f64,
                "progress"
            );
        }
    }

    // The clock stops once the slowest rank has finished its last generation.
    comm.barrier()?;
    let elapsed: Duration = start.elapsed();

    if rank != ROOT {
        scatter::send_block(comm, buffers.active())?;
        return Ok(None);
    }

    let mut grid = match resources.full.take() {
        Some(grid) => grid,
        None => FullGrid::new(grid_size)?,
    };
    scatter::gather(comm, &mut grid, buffers.active(), partition)?;
    let population = grid.population();
    info!(population, elapsed_ms = elapsed.as_millis() as u64, "run complete");
    Ok(Some(RunReport {
        grid,
        generations,
        population,
        elapsed,
    }))
}

/// Runs a whole group of `workers` ranks as threads of this process and returns rank 0's
/// report.
///
/// When ranks fail, the error reported is the one that caused the abort rather than the
/// `Aborted` echoes of the other ranks.
pub fn run_local_group(
    workers: usize,
    config: &RunConfig,
    shutdown: &ShutdownFlag,
) -> Result<RunReport> {
    if workers == 0 {
        return Err(LifeError::InvalidTopology {
            workers,
            grid_size: config.parameters.grid_size(),
        });
    }
    let results = LocalGroup::run(workers, |comm| run_rank(&comm, config, shutdown));

    // Rank 0's report, or the first real error. `Aborted` results are only echoes of
    // that error and are reported when nothing better is available.
    let mut root_report = None;
    let mut echo = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(report) if rank == ROOT => root_report = report,
            Ok(_) => {}
            Err(e @ LifeError::Aborted { .. }) => {
                echo.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    if let Some(e) = echo {
        return Err(e);
    }
    root_report.ok_or_else(|| LifeError::communication(ROOT, "rank 0 produced no report"))
}
