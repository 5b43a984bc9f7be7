//! Conway's Game of Life on an N x N grid, split row-wise across a group of ranks.
//!
//! Rank 0 owns the full grid. It hands every rank a contiguous block of rows, each rank
//! advances its block generation by generation while swapping boundary rows with its two
//! row neighbours, and at the end rank 0 collects the blocks back. The result is identical
//! to evolving the whole grid in a single process, see [`evolve::evolve_serial`].

pub mod comm;
pub mod error;
pub mod evolve;
pub mod grid;
pub mod halo;
pub mod lifecycle;
pub mod logging;
pub mod params;
pub mod partition;
pub mod scatter;
pub mod signal;
pub mod topology;

pub use error::{LifeError, Result};
pub use grid::{Cell, FullGrid, LocalGrid};
pub use lifecycle::{run_local_group, run_rank, RunReport};
pub use params::{InitialState, Parameters, RunConfig};
pub use partition::{partition, Partition};
pub use topology::RowBoundary;
