//! MPI process group over `MPI_COMM_WORLD`.
//!
//! Run with `mpirun -n <P> game_of_life_rows --backend mpi <generations> <grid_size>`.
//!
//! The MPI library is left with its default `MPI_ERRORS_ARE_FATAL` handler, so any
//! transport error already terminates every process of the job. That is the same outcome
//! as an explicit `abort`, which is why the calls below have nothing to propagate.

use mpi::topology::{Rank, SystemCommunicator};
use mpi::traits::*;

use super::{Comm, Inbound, Outbound, Tag};
use crate::error::{LifeError, Result};
use crate::grid::Cell;

pub struct MpiComm {
    world: SystemCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Wraps the world communicator. `universe` has to outlive the returned value; dropping
    /// it finalizes MPI.
    pub fn new(universe: &mpi::environment::Universe) -> Self {
        let world = universe.world();
        MpiComm {
            rank: world.rank() as usize,
            size: world.size() as usize,
            world,
        }
    }

    fn peer(&self, rank: usize) -> Result<mpi::topology::Process<'_, SystemCommunicator>> {
        if rank >= self.size {
            return Err(LifeError::communication(
                rank,
                format!("no such rank in a group of {}", self.size),
            ));
        }
        Ok(self.world.process_at_rank(rank as Rank))
    }
}

fn tag(tag: Tag) -> mpi::Tag {
    tag as mpi::Tag
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_count(&self, dest: usize, t: Tag, count: u64) -> Result<()> {
        self.peer(dest)?.send_with_tag(&count, tag(t));
        Ok(())
    }

    fn receive_count(&self, source: usize, t: Tag) -> Result<u64> {
        let (count, _status) = self.peer(source)?.receive_with_tag::<u64>(tag(t));
        Ok(count)
    }

    fn send_rows(&self, dest: usize, t: Tag, rows: &[Cell]) -> Result<()> {
        self.peer(dest)?.send_with_tag(rows, tag(t));
        Ok(())
    }

    fn receive_rows(&self, source: usize, t: Tag, rows: &mut [Cell]) -> Result<()> {
        let status = self.peer(source)?.receive_into_with_tag(rows, tag(t));
        let received = status.count(Cell::equivalent_datatype()) as usize;
        if received != rows.len() {
            return Err(LifeError::communication(
                source,
                format!("{:?}: expected {} cells, got {}", t, rows.len(), received),
            ));
        }
        Ok(())
    }

    fn exchange(&self, outbound: &[Outbound<'_>], inbound: &mut [Inbound<'_>]) -> Result<()> {
        for inb in inbound.iter() {
            self.peer(inb.source)?;
        }
        for out in outbound {
            self.peer(out.dest)?;
        }

        mpi::request::scope(|scope| {
            let mut requests = Vec::with_capacity(inbound.len() + outbound.len());
            // Receives first, so a matching send always finds a posted buffer.
            for inb in inbound.iter_mut() {
                requests.push(
                    self.world
                        .process_at_rank(inb.source as Rank)
                        .immediate_receive_into_with_tag(scope, &mut *inb.rows, tag(inb.tag)),
                );
            }
            for out in outbound {
                requests.push(
                    self.world
                        .process_at_rank(out.dest as Rank)
                        .immediate_send_with_tag(scope, out.rows, tag(out.tag)),
                );
            }
            for request in requests {
                request.wait();
            }
        });
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn abort(&self, cause: &LifeError) {
        tracing::error!(rank = self.rank, error = %cause, "aborting MPI job");
        self.world.abort(cause.exit_code())
    }

    fn aborted_by(&self) -> Option<usize> {
        // A running process never observes an MPI abort; it is killed by it.
        None
    }
}
