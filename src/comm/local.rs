//! In-process group: one thread per rank, channels instead of a network.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use super::{Comm, Inbound, Outbound, Tag};
use crate::error::{LifeError, Result};
use crate::grid::Cell;

/// How often a blocked receive checks whether the group was aborted.
const ABORT_POLL: Duration = Duration::from_millis(20);

const NOT_ABORTED: usize = usize::MAX;

#[derive(Debug)]
enum Message {
    Count(u64),
    Rows(Vec<Cell>),
    Token,
}

/// Group-wide abort state. Holds the rank that aborted first.
#[derive(Debug)]
struct AbortState {
    origin: AtomicUsize,
}

impl AbortState {
    fn trigger(&self, rank: usize) -> bool {
        self.origin
            .compare_exchange(NOT_ABORTED, rank, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn origin(&self) -> Option<usize> {
        match self.origin.load(Ordering::SeqCst) {
            NOT_ABORTED => None,
            rank => Some(rank),
        }
    }
}

/// Endpoint of one rank in a [`LocalGroup`].
///
/// There is one unbounded channel per (source, destination, tag), so sends never block and
/// two messages from the same source with the same tag can't overtake each other.
pub struct LocalComm {
    rank: usize,
    size: usize,
    // outboxes[dest][tag]
    outboxes: Vec<Vec<Sender<Message>>>,
    // inboxes[source][tag]
    inboxes: Vec<Vec<Receiver<Message>>>,
    abort: Arc<AbortState>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

/// Builds and runs groups of [`LocalComm`] endpoints.
pub struct LocalGroup;

impl LocalGroup {
    /// Creates `size` connected endpoints, indexed by rank.
    pub fn endpoints(size: usize) -> Vec<LocalComm> {
        let abort = Arc::new(AbortState {
            origin: AtomicUsize::new(NOT_ABORTED),
        });

        // senders[src][dest][tag], receivers[dest][src][tag]
        let mut senders: Vec<Vec<Vec<Sender<Message>>>> = (0..size)
            .map(|_| (0..size).map(|_| Vec::with_capacity(Tag::COUNT)).collect())
            .collect();
        let mut receivers: Vec<Vec<Vec<Receiver<Message>>>> = (0..size)
            .map(|_| (0..size).map(|_| Vec::with_capacity(Tag::COUNT)).collect())
            .collect();
        for src in 0..size {
            for dest in 0..size {
                for _ in Tag::ALL {
                    let (tx, rx) = flume::unbounded();
                    senders[src][dest].push(tx);
                    receivers[dest][src].push(rx);
                }
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                size,
                outboxes,
                inboxes,
                abort: Arc::clone(&abort),
            })
            .collect()
    }

    /// Runs `f` once per rank, each on its own thread, and returns the results in rank
    /// order.
    ///
    /// A rank that panics is reported as a communication failure and aborts the group in
    /// its own name, so the remaining ranks see `Aborted { origin }` for the panicking rank
    /// instead of waiting for it forever.
    pub fn run<T, F>(size: usize, f: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(LocalComm) -> Result<T> + Sync,
    {
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = LocalGroup::endpoints(size)
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank;
                    let abort = Arc::clone(&comm.abort);
                    thread::Builder::new()
                        .name(format!("rank-{}", rank))
                        .spawn_scoped(scope, move || {
                            match panic::catch_unwind(AssertUnwindSafe(|| f(comm))) {
                                Ok(result) => result,
                                Err(_) => {
                                    abort.trigger(rank);
                                    Err(LifeError::communication(rank, "rank panicked"))
                                }
                            }
                        })
                        .map_err(|e| (rank, e))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(LifeError::communication(usize::MAX, "rank thread lost"))
                    }),
                    Err((rank, e)) => Err(LifeError::communication(
                        rank,
                        format!("failed to spawn rank thread: {}", e),
                    )),
                })
                .collect()
        })
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        // The channels close when the fields drop, after this runs. A rank unwinding
        // from a panic has to claim the abort first, or a peer blocked on it sees the
        // disconnect and aborts the group in its own name.
        if thread::panicking() && self.abort.trigger(self.rank) {
            tracing::error!(rank = self.rank, "rank panicked, aborting process group");
        }
    }
}

impl LocalComm {
    fn check_abort(&self) -> Result<()> {
        match self.abort.origin() {
            Some(origin) => Err(LifeError::Aborted { origin }),
            None => Ok(()),
        }
    }

    fn check_peer(&self, peer: usize) -> Result<()> {
        if peer >= self.size {
            return Err(LifeError::communication(
                peer,
                format!("no such rank in a group of {}", self.size),
            ));
        }
        Ok(())
    }

    fn post(&self, dest: usize, tag: Tag, message: Message) -> Result<()> {
        self.check_abort()?;
        self.check_peer(dest)?;
        if self.outboxes[dest][tag.index()].send(message).is_err() {
            self.check_abort()?;
            return Err(LifeError::communication(
                dest,
                format!("{:?}: peer has exited", tag),
            ));
        }
        Ok(())
    }

    fn take(&self, source: usize, tag: Tag) -> Result<Message> {
        self.check_peer(source)?;
        let inbox = &self.inboxes[source][tag.index()];
        loop {
            self.check_abort()?;
            match inbox.recv_timeout(ABORT_POLL) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // A rank that died mid-run usually aborted first; report that instead.
                    self.check_abort()?;
                    return Err(LifeError::communication(
                        source,
                        format!("{:?}: peer has exited", tag),
                    ));
                }
            }
        }
    }

    fn take_rows_into(&self, source: usize, tag: Tag, rows: &mut [Cell]) -> Result<()> {
        match self.take(source, tag)? {
            Message::Rows(payload) if payload.len() == rows.len() => {
                rows.copy_from_slice(&payload);
                Ok(())
            }
            Message::Rows(payload) => Err(LifeError::communication(
                source,
                format!(
                    "{:?}: expected {} cells, got {}",
                    tag,
                    rows.len(),
                    payload.len()
                ),
            )),
            other => Err(LifeError::communication(
                source,
                format!("{:?}: expected rows, got {:?}", tag, other),
            )),
        }
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_count(&self, dest: usize, tag: Tag, count: u64) -> Result<()> {
        self.post(dest, tag, Message::Count(count))
    }

    fn receive_count(&self, source: usize, tag: Tag) -> Result<u64> {
        match self.take(source, tag)? {
            Message::Count(count) => Ok(count),
            other => Err(LifeError::communication(
                source,
                format!("{:?}: expected a count, got {:?}", tag, other),
            )),
        }
    }

    fn send_rows(&self, dest: usize, tag: Tag, rows: &[Cell]) -> Result<()> {
        self.post(dest, tag, Message::Rows(rows.to_vec()))
    }

    fn receive_rows(&self, source: usize, tag: Tag, rows: &mut [Cell]) -> Result<()> {
        self.take_rows_into(source, tag, rows)
    }

    fn exchange(&self, outbound: &[Outbound<'_>], inbound: &mut [Inbound<'_>]) -> Result<()> {
        // Channel receives can't be posted ahead of time. Sends are buffered and never
        // block, so sending everything first and then draining the inboxes gives the same
        // no-deadlock guarantee as posting the receives first.
        for out in outbound {
            self.post(out.dest, out.tag, Message::Rows(out.rows.to_vec()))?;
        }
        for inb in inbound.iter_mut() {
            self.take_rows_into(inb.source, inb.tag, inb.rows)?;
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        if self.rank == 0 {
            for peer in 1..self.size {
                self.take(peer, Tag::Barrier)?;
            }
            for peer in 1..self.size {
                self.post(peer, Tag::Barrier, Message::Token)?;
            }
        } else {
            self.post(0, Tag::Barrier, Message::Token)?;
            self.take(0, Tag::Barrier)?;
        }
        Ok(())
    }

    fn abort(&self, cause: &LifeError) {
        if self.abort.trigger(self.rank) {
            tracing::error!(rank = self.rank, error = %cause, "aborting process group");
        }
    }

    fn aborted_by(&self) -> Option<usize> {
        self.abort.origin()
    }
}
