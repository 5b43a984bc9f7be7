//! Moving row blocks between rank 0's full grid and the workers.
//!
//! Each transfer is two messages: the row count first, then the padded rows it describes.
//! The receiver blocks on the count before it asks for the payload, so a block is never
//! read without knowing its size. Rank 0 serves the other ranks in rank order.

use tracing::{debug, instrument};

use crate::comm::{Comm, Tag};
use crate::error::{LifeError, Result};
use crate::grid::{Cell, FullGrid, LocalGrid};
use crate::partition::Partition;

pub const ROOT: usize = 0;

/// Rank 0: sends every other rank its block and returns rank 0's own block.
#[instrument(level = "debug", skip_all, fields(workers = partition.workers()))]
pub fn distribute<C: Comm + ?Sized>(
    comm: &C,
    full: &FullGrid,
    partition: &Partition,
) -> Result<LocalGrid> {
    check_shape(full, partition)?;
    let n = full.size();

    // Own block is copied straight out of the full grid, no round trip.
    let mut own = LocalGrid::new(partition.rows(ROOT), n)?;
    let block = full
        .matrix()
        .rows_slice(partition.offset(ROOT) + 1, partition.rows(ROOT));
    own.interior_mut().copy_from_slice(block);

    // Every other rank gets its count first and then its rows, one rank at a time. The
    // block is a contiguous run of padded rows, border columns included, so it goes out
    // as a single message without repacking.
    for rank in 1..partition.workers() {
        let rows: usize = partition.rows(rank);
        let block: &[Cell] = full
            .matrix()
            .rows_slice(partition.offset(rank) + 1, rows);
        comm.send_count(rank, Tag::RowCount, rows as u64)?;
        comm.send_rows(rank, Tag::RowBlock, block)?;
        debug!(rank, rows, "sent row block");
    }
    Ok(own)
}

/// Every rank except 0: receives the block sent by [`distribute`].
#[instrument(level = "debug", skip_all, fields(rank = comm.rank()))]
pub fn receive_block<C: Comm + ?Sized>(comm: &C, partition: &Partition) -> Result<LocalGrid> {
    let rank: usize = comm.rank();
    let rows: usize = expect_rows(comm.receive_count(ROOT, Tag::RowCount)?, partition, rank, ROOT)?;

    // The ghost rows start out dead and are only filled by the first halo exchange.
    let mut local = LocalGrid::new(rows, partition.grid_size())?;
    comm.receive_rows(ROOT, Tag::RowBlock, local.interior_mut())?;
    debug!(rows, "received row block");
    Ok(local)
}

/// Rank 0: reassembles the full grid from its own block and everybody else's.
#[instrument(level = "debug", skip_all, fields(workers = partition.workers()))]
pub fn gather<C: Comm + ?Sized>(
    comm: &C,
    full: &mut FullGrid,
    own: &LocalGrid,
    partition: &Partition,
) -> Result<()> {
    check_shape(full, partition)?;

    // Rank 0's own rows go straight back into place.
    full.matrix_mut()
        .rows_slice_mut(partition.offset(ROOT) + 1, own.local_rows())
        .copy_from_slice(own.interior());

    // Collected in rank order, so the receive for rank r only matches rank r's send and
    // its rows land at rank r's offset no matter when they arrive.
    for rank in 1..partition.workers() {
        let rows: usize =
            expect_rows(comm.receive_count(rank, Tag::GatherCount)?, partition, rank, rank)?;
        let block = full
            .matrix_mut()
            .rows_slice_mut(partition.offset(rank) + 1, rows);
        comm.receive_rows(rank, Tag::GatherBlock, block)?;
        debug!(rank, rows, "gathered row block");
    }
    Ok(())
}

/// Every rank except 0: sends its final block back for [`gather`].
pub fn send_block<C: Comm + ?Sized>(comm: &C, local: &LocalGrid) -> Result<()> {
    // Only the interior travels back; ghost rows are stale by now.
    comm.send_count(ROOT, Tag::GatherCount, local.local_rows() as u64)?;
    comm.send_rows(ROOT, Tag::GatherBlock, local.interior())
}

fn check_shape(full: &FullGrid, partition: &Partition) -> Result<()> {
    if full.size() != partition.grid_size() {
        return Err(LifeError::Parameter(format!(
            "grid is {}x{} but the partition covers {} rows",
            full.size(),
            full.size(),
            partition.grid_size()
        )));
    }
    Ok(())
}

/// The announced row count has to agree with the partition every rank computed for itself.
fn expect_rows(announced: u64, partition: &Partition, rank: usize, peer: usize) -> Result<usize> {
    let expected = partition.rows(rank);
    if announced != expected as u64 {
        return Err(LifeError::communication(
            peer,
            format!(
                "rank {} announced {} rows, partition assigns {}",
                rank, announced, expected
            ),
        ));
    }
    Ok(expected)
}
