use crate::error::{LifeError, Result};
use crate::grid::{Cell, CellMatrix, FullGrid, LocalGrid, ALIVE, DEAD};
use crate::topology::RowBoundary;

/// Conway's rule for one cell.
#[inline]
pub fn next_state(cell: Cell, neighbors: u32) -> Cell {
    match (cell, neighbors) {
        (ALIVE, 2) | (ALIVE, 3) => ALIVE,
        (DEAD, 3) => ALIVE,
        _ => DEAD,
    }
}

/// Writes the next generation of every interior cell of `current` into `next`.
///
/// Only reads `current` (ghost rows and border columns included) and only writes the
/// interior of `next`, so `next`'s ghost rows and border columns are left untouched.
pub fn step_matrix(current: &CellMatrix, next: &mut CellMatrix) {
    debug_assert_eq!(current.rows(), next.rows());
    debug_assert_eq!(current.cols(), next.cols());
    let cols = current.cols();

    for i in 1..=current.rows() {
        let above = current.row(i - 1);
        let here = current.row(i);
        let below = current.row(i + 1);
        let out = next.row_mut(i);
        for j in 1..=cols {
            // Widened per cell: `Cell` is a plain byte and may hold more than 1.
            let neighbors: u32 = [
                above[j - 1],
                above[j],
                above[j + 1],
                here[j - 1],
                here[j + 1],
                below[j - 1],
                below[j],
                below[j + 1],
            ]
            .iter()
            .map(|&c| u32::from(c))
            .sum();
            out[j] = next_state(here[j], neighbors);
        }
    }
}

/// Advances one worker's block by one generation.
///
/// `current`'s ghost rows must already hold this generation's halo.
pub fn step(current: &LocalGrid, next: &mut LocalGrid) {
    step_matrix(current.matrix(), next.matrix_mut());
}

/// Single-process evolution of the whole board with the same boundary policy as the
/// distributed run. The result is what every distributed run has to reproduce exactly.
pub fn evolve_serial(grid: &FullGrid, generations: usize, boundary: RowBoundary) -> Result<FullGrid> {
    evolve_serial_until(grid, generations, boundary, || false)
}

/// [`evolve_serial`] that checks `stop` before every generation and gives up with
/// [`LifeError::ExternalSignal`] once it returns true.
pub fn evolve_serial_until<F>(
    grid: &FullGrid,
    generations: usize,
    boundary: RowBoundary,
    mut stop: F,
) -> Result<FullGrid>
where
    F: FnMut() -> bool,
{
    let mut current = grid.clone();
    let mut next = FullGrid::new(grid.size())?;
    for _ in 0..generations {
        if stop() {
            return Err(LifeError::ExternalSignal);
        }
        fill_pad_rows(current.matrix_mut(), boundary);
        step_matrix(current.matrix(), next.matrix_mut());
        std::mem::swap(&mut current, &mut next);
    }
    // Pad rows are scratch space; hand back the clean form.
    let n = current.size();
    current.matrix_mut().row_mut(0).fill(DEAD);
    current.matrix_mut().row_mut(n + 1).fill(DEAD);
    Ok(current)
}

fn fill_pad_rows(matrix: &mut CellMatrix, boundary: RowBoundary) {
    let n = matrix.rows();
    match boundary {
        RowBoundary::Toroidal => {
            let last = matrix.row(n).to_vec();
            let first = matrix.row(1).to_vec();
            matrix.row_mut(0).copy_from_slice(&last);
            matrix.row_mut(n + 1).copy_from_slice(&first);
        }
        RowBoundary::Dead => {
            matrix.row_mut(0).fill(DEAD);
            matrix.row_mut(n + 1).fill(DEAD);
        }
    }
}
