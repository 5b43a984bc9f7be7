use thiserror::Error;

pub type Result<T, E = LifeError> = std::result::Result<T, E>;

/// Everything that can stop a run.
///
/// `Parameter` and `InvalidTopology` are detected before any grid exists or any message is
/// sent, so the process simply exits. Every other variant means the row-blocks held by the
/// group are no longer consistent and the whole group has to go down.
#[derive(Debug, Error)]
pub enum LifeError {
    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error("invalid topology: {workers} workers cannot split {grid_size} rows (need workers <= rows)")]
    InvalidTopology { workers: usize, grid_size: usize },

    #[error("failed to allocate a {rows}x{cols} cell buffer")]
    Allocation { rows: usize, cols: usize },

    #[error("communication with rank {peer} failed: {reason}")]
    Communication { peer: usize, reason: String },

    #[error("received external shutdown signal")]
    ExternalSignal,

    #[error("run aborted by rank {origin}")]
    Aborted { origin: usize },
}

impl LifeError {
    pub fn communication(peer: usize, reason: impl Into<String>) -> Self {
        LifeError::Communication {
            peer,
            reason: reason.into(),
        }
    }

    /// Whether this error has to be propagated to the whole group.
    ///
    /// `Aborted` is already the echo of somebody else's abort, so it does not start another.
    pub fn requires_group_abort(&self) -> bool {
        match self {
            LifeError::Parameter(_) | LifeError::InvalidTopology { .. } => false,
            LifeError::Aborted { .. } => false,
            LifeError::Allocation { .. }
            | LifeError::Communication { .. }
            | LifeError::ExternalSignal => true,
        }
    }

    /// Exit status used by the binary and by `MPI_Abort`.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifeError::Parameter(_) | LifeError::InvalidTopology { .. } => 2,
            LifeError::ExternalSignal => 130,
            _ => 1,
        }
    }
}
