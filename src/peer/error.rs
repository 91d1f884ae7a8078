use thiserror::Error;

/// Errors that end (or fail to establish) a peer session.
///
/// All of these are local to one session; none of them propagate past the
/// session task except by ending it.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The handshake's protocol string or info hash did not match.
    #[error("handshake mismatch: {0}")]
    HandshakeMismatch(&'static str),

    /// A frame violated the wire format: oversized, unknown tag, or a
    /// payload whose shape does not match its tag.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer closed the connection between frames.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read, write, or connect exceeded its deadline.
    #[error("timeout")]
    Timeout,

    /// The piece engine rejected a block structurally (disk failure).
    #[error("engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),
}
