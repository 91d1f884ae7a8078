use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Piece index past the end of the torrent.
    #[error("unknown piece index {0}")]
    UnknownPiece(u32),

    /// Piece is verified or claimed by another session.
    #[error("piece {0} is not available to claim")]
    Unavailable(u32),

    /// The in-progress soft cap was hit even after sweeping stale pieces.
    #[error("too many pieces in progress")]
    TooManyInProgress,

    /// Output file write failed; fatal for the whole download.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
