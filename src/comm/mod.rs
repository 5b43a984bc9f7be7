//! Message passing between the ranks of a run.
//!
//! The core only talks to the group through [`Comm`]. Two backends implement it:
//! [`LocalComm`], where every rank is a thread of the current process, and `MpiComm`
//! (feature `mpi`), where every rank is an MPI process.

use crate::error::{LifeError, Result};
use crate::grid::Cell;

mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;

pub use local::{LocalComm, LocalGroup};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// Message tags. A receive only ever matches a send with the same source and tag, and
/// messages with the same source and tag arrive in the order they were sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Tag {
    /// Row count announced before a distributed block.
    RowCount = 0,
    /// Row block sent by rank 0 during distribution.
    RowBlock = 1,
    /// Row count announced before a gathered block.
    GatherCount = 2,
    /// Final row block sent back to rank 0.
    GatherBlock = 3,
    /// Boundary row travelling toward the higher rank (lands in its top ghost row).
    HaloDown = 4,
    /// Boundary row travelling toward the lower rank (lands in its bottom ghost row).
    HaloUp = 5,
    Barrier = 6,
}

impl Tag {
    pub const COUNT: usize = 7;

    pub const ALL: [Tag; Tag::COUNT] = [
        Tag::RowCount,
        Tag::RowBlock,
        Tag::GatherCount,
        Tag::GatherBlock,
        Tag::HaloDown,
        Tag::HaloUp,
        Tag::Barrier,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A row buffer to send as part of an [`Comm::exchange`].
pub struct Outbound<'a> {
    pub dest: usize,
    pub tag: Tag,
    pub rows: &'a [Cell],
}

/// A row buffer to fill as part of an [`Comm::exchange`].
pub struct Inbound<'a> {
    pub source: usize,
    pub tag: Tag,
    pub rows: &'a mut [Cell],
}

/// One rank's endpoint into the process group.
///
/// All fallible calls fail with `Communication` when the transport breaks and with
/// `Aborted` once any rank has aborted the group.
pub trait Comm {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send_count(&self, dest: usize, tag: Tag, count: u64) -> Result<()>;

    fn receive_count(&self, source: usize, tag: Tag) -> Result<u64>;

    fn send_rows(&self, dest: usize, tag: Tag, rows: &[Cell]) -> Result<()>;

    /// Receives exactly `rows.len()` cells into `rows`.
    fn receive_rows(&self, source: usize, tag: Tag, rows: &mut [Cell]) -> Result<()>;

    /// Sends every outbound buffer, fills every inbound one and returns once all of them
    /// have completed.
    ///
    /// Must not deadlock when two ranks exchange with each other at the same time, or a
    /// rank exchanges with itself. `MpiComm` posts the receives before the sends;
    /// `LocalComm` sends into unbounded channels first and receives afterwards.
    fn exchange(&self, outbound: &[Outbound<'_>], inbound: &mut [Inbound<'_>]) -> Result<()>;

    /// Blocks until every rank of the group has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Tears the whole group down because of `cause`.
    fn abort(&self, cause: &LifeError);

    /// Rank that aborted the group, if any.
    fn aborted_by(&self) -> Option<usize>;
}
