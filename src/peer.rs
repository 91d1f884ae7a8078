//! Peer wire protocol (BEP-3)
//!
//! The handshake and message codec, the framed transport, and the per-peer
//! download session. The engine is leech-only: it requests and receives
//! blocks but never serves them.

mod bitfield;
mod error;
mod message;
mod peer_id;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use session::{PeerSession, SessionContext};
pub use transport::PeerTransport;

#[cfg(test)]
mod tests;
