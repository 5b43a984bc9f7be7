use crate::error::{LifeError, Result};
use crate::grid::FullGrid;
use crate::topology::RowBoundary;

/// Largest N accepted for an NxN grid.
pub const MAX_GRID_SIZE: usize = 10_000;
/// Largest generation count accepted.
pub const MAX_GENERATIONS: usize = 1_000_000;

/// Validated `(generations, grid_size)` pair.
///
/// The only way to get one is `Parameters::new`, so holding a `Parameters` means the
/// numbers were checked before any grid was allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    generations: usize,
    grid_size: usize,
}

impl Parameters {
    pub fn new(generations: usize, grid_size: usize) -> Result<Self> {
        if generations == 0 {
            return Err(LifeError::Parameter(
                "generations must be a positive integer".to_string(),
            ));
        }
        if generations > MAX_GENERATIONS {
            return Err(LifeError::Parameter(format!(
                "too many generations (maximum: {}, got {})",
                MAX_GENERATIONS, generations
            )));
        }
        if grid_size == 0 {
            return Err(LifeError::Parameter(
                "grid_size must be a positive integer".to_string(),
            ));
        }
        if grid_size > MAX_GRID_SIZE {
            return Err(LifeError::Parameter(format!(
                "grid size too large (maximum: {}, got {})",
                MAX_GRID_SIZE, grid_size
            )));
        }
        Ok(Parameters {
            generations,
            grid_size,
        })
    }

    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }
}

/// Where the starting grid on rank 0 comes from.
#[derive(Debug, Clone)]
pub enum InitialState {
    /// Fill every interior cell independently, alive with probability `density`.
    Random { seed: u64, density: f64 },
    /// Start from a fixed grid. Its size must match `Parameters::grid_size`.
    Pattern(FullGrid),
}

impl Default for InitialState {
    fn default() -> Self {
        InitialState::Random {
            seed: DEFAULT_SEED,
            density: 0.5,
        }
    }
}

pub const DEFAULT_SEED: u64 = 0x5EED_1234_ABCD_EF01;

/// Everything a rank needs to know to take part in a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub parameters: Parameters,
    pub initial: InitialState,
    pub boundary: RowBoundary,
    /// Rank 0 logs progress every this many generations. Zero disables it.
    pub progress_interval: usize,
}

impl RunConfig {
    pub fn new(parameters: Parameters) -> Self {
        RunConfig {
            parameters,
            initial: InitialState::default(),
            boundary: RowBoundary::default(),
            progress_interval: 10,
        }
    }

    pub fn with_initial(mut self, initial: InitialState) -> Self {
        self.initial = initial;
        self
    }

    pub fn with_boundary(mut self, boundary: RowBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }
}
