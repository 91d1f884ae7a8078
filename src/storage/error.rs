use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("write past end of data: piece {piece}, offset {offset}")]
    OutOfRange { piece: u32, offset: u32 },

    #[error("path traversal detected in file path: {0}")]
    PathTraversal(String),
}
