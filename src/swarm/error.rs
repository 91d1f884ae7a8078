use crate::storage::StorageError;
use crate::tracker::TrackerError;
use thiserror::Error;

/// Unrecoverable swarm conditions. Everything session-local stays inside
/// the sessions; only these escape [`Swarm::run`](super::Swarm::run).
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Startup found neither a responding tracker nor seeded peers.
    #[error("no reachable tracker and no candidate peers")]
    AllTrackersUnreachable(#[source] TrackerError),

    /// No piece verified through every recovery round.
    #[error("swarm stalled after {0} recovery rounds")]
    Stalled(u32),

    /// Output file creation or write failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StorageError> for SwarmError {
    fn from(e: StorageError) -> Self {
        SwarmError::Storage(e.to_string())
    }
}
