//! Padded cell storage.
//!
//! Every matrix keeps a one-cell pad on all four sides. For the full grid the pad is just
//! a permanently dead frame that lets neighbour counting treat edge cells like any other.
//! For a worker's local grid the top and bottom pad rows are the ghost rows filled by the
//! halo exchange, while the left and right pad columns stay dead forever.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::{LifeError, Result};

/// A single cell: 1 is alive, 0 is dead.
pub type Cell = u8;

pub const ALIVE: Cell = 1;
pub const DEAD: Cell = 0;

/// Row-major `(rows + 2) x (cols + 2)` cell buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct CellMatrix {
    cells: Vec<Cell>,
    rows: usize,
    cols: usize,
}

impl CellMatrix {
    /// Allocates an all-dead matrix with `rows x cols` interior cells.
    ///
    /// Allocation failure is reported instead of aborting the process, so the caller can
    /// take the group down cleanly.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        let len = (rows + 2)
            .checked_mul(cols + 2)
            .ok_or(LifeError::Allocation { rows, cols })?;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| LifeError::Allocation { rows, cols })?;
        cells.resize(len, DEAD);
        Ok(CellMatrix { cells, rows, cols })
    }

    /// Number of interior rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of interior columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Width of a stored row, border columns included.
    pub fn padded_cols(&self) -> usize {
        self.cols + 2
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Full padded row `i`, where `0` and `rows + 1` are the pad rows.
    pub fn row(&self, i: usize) -> &[Cell] {
        let w = self.padded_cols();
        &self.cells[i * w..(i + 1) * w]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [Cell] {
        let w = self.padded_cols();
        &mut self.cells[i * w..(i + 1) * w]
    }

    /// Contiguous padded rows `first..first + count`.
    pub fn rows_slice(&self, first: usize, count: usize) -> &[Cell] {
        let w = self.padded_cols();
        &self.cells[first * w..(first + count) * w]
    }

    pub fn rows_slice_mut(&mut self, first: usize, count: usize) -> &mut [Cell] {
        let w = self.padded_cols();
        &mut self.cells[first * w..(first + count) * w]
    }

    /// Padded indices, `1..=rows` / `1..=cols` address the interior.
    pub fn get(&self, i: usize, j: usize) -> Cell {
        self.cells[i * self.padded_cols() + j]
    }

    pub fn set(&mut self, i: usize, j: usize, cell: Cell) {
        let w = self.padded_cols();
        self.cells[i * w + j] = cell;
    }

    /// Sum of all interior cells.
    pub fn population(&self) -> u64 {
        (1..=self.rows)
            .map(|i| {
                self.row(i)[1..=self.cols]
                    .iter()
                    .map(|&c| c as u64)
                    .sum::<u64>()
            })
            .sum()
    }

    /// Clears every cell, pads included.
    pub fn zeroize(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = DEAD);
    }
}

impl std::fmt::Debug for CellMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CellMatrix {}x{} (padded)", self.rows + 2, self.cols + 2)?;
        for i in 0..self.rows + 2 {
            for &c in self.row(i) {
                f.write_str(if c == ALIVE { "#" } else { "." })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The whole N x N board, only ever complete on rank 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullGrid {
    matrix: CellMatrix,
}

impl FullGrid {
    pub fn new(size: usize) -> Result<Self> {
        Ok(FullGrid {
            matrix: CellMatrix::new(size, size)?,
        })
    }

    /// Random board. The same `(size, seed, density)` always gives the same board.
    pub fn random(size: usize, seed: u64, density: f64) -> Result<Self> {
        let mut grid = FullGrid::new(size)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let threshold = (u64::MAX as f64 * density.clamp(0.0, 1.0)) as u64;
        for i in 1..=size {
            for j in 1..=size {
                // Strictly below the threshold so density 0.0 really is empty.
                let alive = rng.next_u64() < threshold;
                grid.matrix.set(i, j, if alive { ALIVE } else { DEAD });
            }
        }
        Ok(grid)
    }

    /// Board with the given live cells, in zero-based `(row, col)` coordinates.
    pub fn with_live_cells(size: usize, live: &[(usize, usize)]) -> Result<Self> {
        let mut grid = FullGrid::new(size)?;
        for &(r, c) in live {
            if r >= size || c >= size {
                return Err(LifeError::Parameter(format!(
                    "cell ({}, {}) is outside a {}x{} grid",
                    r, c, size, size
                )));
            }
            grid.set_alive(r, c, true);
        }
        Ok(grid)
    }

    pub fn size(&self) -> usize {
        self.matrix.rows()
    }

    /// Zero-based interior access.
    pub fn is_alive(&self, row: usize, col: usize) -> bool {
        self.matrix.get(row + 1, col + 1) == ALIVE
    }

    pub fn set_alive(&mut self, row: usize, col: usize, alive: bool) {
        self.matrix
            .set(row + 1, col + 1, if alive { ALIVE } else { DEAD });
    }

    /// Zero-based `(row, col)` of every live cell, in row-major order.
    pub fn live_cells(&self) -> Vec<(usize, usize)> {
        let n = self.size();
        let mut out = Vec::new();
        for r in 0..n {
            for c in 0..n {
                if self.is_alive(r, c) {
                    out.push((r, c));
                }
            }
        }
        out
    }

    pub fn population(&self) -> u64 {
        self.matrix.population()
    }

    /// `#`/`.` text, one line per row.
    pub fn render(&self) -> String {
        let n = self.size();
        let mut out = String::with_capacity(n * (2 * n + 1));
        for r in 0..n {
            for c in 0..n {
                out.push(if self.is_alive(r, c) { '#' } else { '.' });
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }

    pub fn matrix(&self) -> &CellMatrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut CellMatrix {
        &mut self.matrix
    }
}

/// One worker's slice of the board: `local_rows` interior rows plus two ghost rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalGrid {
    matrix: CellMatrix,
}

/// Disjoint views of the four rows the halo exchange touches.
pub struct HaloRows<'a> {
    pub top_ghost: &'a mut [Cell],
    pub first: &'a [Cell],
    pub last: &'a [Cell],
    pub bottom_ghost: &'a mut [Cell],
}

impl LocalGrid {
    pub fn new(local_rows: usize, grid_size: usize) -> Result<Self> {
        Ok(LocalGrid {
            matrix: CellMatrix::new(local_rows, grid_size)?,
        })
    }

    pub fn local_rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn grid_size(&self) -> usize {
        self.matrix.cols()
    }

    /// The interior rows as one contiguous padded block.
    pub fn interior(&self) -> &[Cell] {
        self.matrix.rows_slice(1, self.local_rows())
    }

    pub fn interior_mut(&mut self) -> &mut [Cell] {
        let rows = self.local_rows();
        self.matrix.rows_slice_mut(1, rows)
    }

    pub fn top_ghost(&self) -> &[Cell] {
        self.matrix.row(0)
    }

    pub fn bottom_ghost(&self) -> &[Cell] {
        self.matrix.row(self.local_rows() + 1)
    }

    /// Splits the buffer so ghost rows can be written while boundary rows are read.
    ///
    /// With a single interior row `first` and `last` are the same row.
    pub fn halo_rows(&mut self) -> HaloRows<'_> {
        let w = self.matrix.padded_cols();
        let rows = self.local_rows();
        let cells = self.matrix.cells_mut();
        let (top_ghost, rest) = cells.split_at_mut(w);
        let (interior, bottom_ghost) = rest.split_at_mut(rows * w);
        let interior: &[Cell] = interior;
        HaloRows {
            top_ghost,
            first: &interior[..w],
            last: &interior[(rows - 1) * w..],
            bottom_ghost,
        }
    }

    pub fn population(&self) -> u64 {
        self.matrix.population()
    }

    pub fn matrix(&self) -> &CellMatrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut CellMatrix {
        &mut self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_is_reproducible_per_seed() {
        let a = FullGrid::random(32, 7, 0.5).unwrap();
        let b = FullGrid::random(32, 7, 0.5).unwrap();
        let c = FullGrid::random(32, 8, 0.5).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn random_never_touches_the_border() {
        let g = FullGrid::random(16, 3, 1.0).unwrap();
        let m = g.matrix();
        assert_eq!(g.population(), 16 * 16);
        assert!(m.row(0).iter().all(|&c| c == DEAD));
        assert!(m.row(17).iter().all(|&c| c == DEAD));
        for i in 0..18 {
            assert_eq!(m.get(i, 0), DEAD);
            assert_eq!(m.get(i, 17), DEAD);
        }
    }

    #[test]
    fn empty_density_gives_empty_grid() {
        assert_eq!(FullGrid::random(20, 1, 0.0).unwrap().population(), 0);
    }

    #[test]
    fn halo_rows_point_at_the_right_rows() {
        let mut g = LocalGrid::new(3, 4).unwrap();
        g.matrix_mut().set(1, 1, ALIVE);
        g.matrix_mut().set(3, 4, ALIVE);
        let halo = g.halo_rows();
        assert_eq!(halo.first[1], ALIVE);
        assert_eq!(halo.last[4], ALIVE);
        halo.top_ghost[2] = ALIVE;
        halo.bottom_ghost[3] = ALIVE;
        assert_eq!(g.top_ghost()[2], ALIVE);
        assert_eq!(g.bottom_ghost()[3], ALIVE);
        assert_eq!(g.population(), 2);
    }

    #[test]
    fn single_row_grid_shares_first_and_last() {
        let mut g = LocalGrid::new(1, 3).unwrap();
        g.matrix_mut().set(1, 2, ALIVE);
        let halo = g.halo_rows();
        assert_eq!(halo.first, halo.last);
    }

    #[test]
    fn impossible_sizes_are_allocation_errors() {
        // Padded length overflows usize.
        assert!(matches!(
            CellMatrix::new(usize::MAX / 2, 1),
            Err(LifeError::Allocation { cols: 1, .. })
        ));
        // Fits in usize but no allocator can hand it out.
        assert!(matches!(
            CellMatrix::new(usize::MAX / 4, 1),
            Err(LifeError::Allocation { cols: 1, .. })
        ));
        assert!(matches!(
            LocalGrid::new(usize::MAX / 2, 1),
            Err(LifeError::Allocation { .. })
        ));
    }

    #[test]
    fn out_of_range_pattern_is_rejected() {
        assert!(matches!(
            FullGrid::with_live_cells(4, &[(4, 0)]),
            Err(LifeError::Parameter(_))
        ));
    }
}
