//! Per-generation exchange of boundary rows with the row-adjacent ranks.
//!
//! A rank's first interior row goes to `prev` as `HaloUp` and lands in prev's bottom
//! ghost row. Its last interior row goes to `next` as `HaloDown` and lands in next's top
//! ghost row. The two directions use different tags so that when `prev == next` (two
//! ranks) or `prev == next == self` (one rank) the transfers can't be confused.

use crate::comm::{Comm, Inbound, Outbound, Tag};
use crate::error::Result;
use crate::grid::{LocalGrid, DEAD};
use crate::topology::RowBoundary;

/// Refreshes both ghost rows of `grid` from the neighbours chosen by `boundary`.
///
/// A side without a neighbour gets a dead ghost row. On return the ghost rows hold the
/// neighbours' current boundary rows and `grid` is ready for a step.
pub fn exchange<C: Comm + ?Sized>(comm: &C, grid: &mut LocalGrid, boundary: RowBoundary) -> Result<()> {
    let neighbors = boundary.neighbors(comm.rank(), comm.size());
    let halo = grid.halo_rows();

    let mut outbound = Vec::with_capacity(2);
    let mut inbound = Vec::with_capacity(2);

    match neighbors.prev {
        Some(prev) => {
            inbound.push(Inbound {
                source: prev,
                tag: Tag::HaloDown,
                rows: halo.top_ghost,
            });
            outbound.push(Outbound {
                dest: prev,
                tag: Tag::HaloUp,
                rows: halo.first,
            });
        }
        None => halo.top_ghost.fill(DEAD),
    }
    match neighbors.next {
        Some(next) => {
            inbound.push(Inbound {
                source: next,
                tag: Tag::HaloUp,
                rows: halo.bottom_ghost,
            });
            outbound.push(Outbound {
                dest: next,
                tag: Tag::HaloDown,
                rows: halo.last,
            });
        }
        None => halo.bottom_ghost.fill(DEAD),
    }

    if inbound.is_empty() && outbound.is_empty() {
        return Ok(());
    }
    comm.exchange(&outbound, &mut inbound)
}
