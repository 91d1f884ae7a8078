use super::error::PeerError;
use crate::constants::MAX_FRAME;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// The BitTorrent protocol identifier string.
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// Length of the handshake frame in bytes.
pub const HANDSHAKE_LEN: usize = 68;

/// Message type tags in the peer wire protocol.
///
/// Every message except `KeepAlive` carries a one-byte tag after the
/// length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(PeerError::MalformedFrame(format!("unknown tag {}", tag))),
        }
    }
}

/// The 68-byte BitTorrent handshake.
///
/// Layout: one byte `19`, the protocol string, 8 reserved bytes, the
/// 20-byte info hash, the 20-byte peer id. Both sides exchange this before
/// any other traffic. The reserved bytes stay zero: this engine speaks no
/// extensions.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// The torrent the connection is about.
    pub info_hash: [u8; 20],
    /// The sender's peer id.
    pub peer_id: [u8; 20],
    /// Capability bits; always zero on the sending side.
    pub reserved: [u8; 8],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            info_hash,
            peer_id,
            reserved: [0u8; 8],
        }
    }

    /// Encodes the handshake for transmission.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    /// Decodes a received handshake, validating the protocol string.
    ///
    /// The info hash is checked at the session layer, where the expected
    /// value is known.
    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::HandshakeMismatch("short handshake"));
        }
        if data[0] as usize != PROTOCOL.len() || &data[1..20] != PROTOCOL {
            return Err(PeerError::HandshakeMismatch("protocol string"));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            info_hash,
            peer_id,
            reserved,
        })
    }
}

/// A peer wire message.
///
/// On the wire each message is a 4-byte big-endian length prefix followed
/// by `length` payload bytes; length zero is `KeepAlive`, otherwise the
/// first payload byte is the [`MessageId`] tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Zero-length heartbeat.
    KeepAlive,
    /// The peer will not serve our requests.
    Choke,
    /// The peer will serve our requests.
    Unchoke,
    /// We want the peer's data.
    Interested,
    /// We no longer want the peer's data.
    NotInterested,
    /// The peer acquired one piece.
    Have { piece: u32 },
    /// All pieces the peer has, MSB of byte 0 being piece 0.
    Bitfield(Bytes),
    /// Ask for a block.
    Request { index: u32, begin: u32, length: u32 },
    /// A block of piece data.
    Piece { index: u32, begin: u32, data: Bytes },
    /// Withdraw a pending request.
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Encodes the message including its length prefix.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::KeepAlive => buf.put_u32(0),
            Message::Choke => Self::put_bare(&mut buf, MessageId::Choke),
            Message::Unchoke => Self::put_bare(&mut buf, MessageId::Unchoke),
            Message::Interested => Self::put_bare(&mut buf, MessageId::Interested),
            Message::NotInterested => Self::put_bare(&mut buf, MessageId::NotInterested),
            Message::Have { piece } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bits);
            }
            Message::Request {
                index,
                begin,
                length,
            } => Self::put_triple(&mut buf, MessageId::Request, *index, *begin, *length),
            Message::Piece { index, begin, data } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => Self::put_triple(&mut buf, MessageId::Cancel, *index, *begin, *length),
        }
        buf.freeze()
    }

    fn put_bare(buf: &mut BytesMut, id: MessageId) {
        buf.put_u32(1);
        buf.put_u8(id as u8);
    }

    fn put_triple(buf: &mut BytesMut, id: MessageId, index: u32, begin: u32, length: u32) {
        buf.put_u32(13);
        buf.put_u8(id as u8);
        buf.put_u32(index);
        buf.put_u32(begin);
        buf.put_u32(length);
    }

    /// Decodes one complete frame, length prefix included.
    ///
    /// The payload shape is validated against the tag: fixed-size messages
    /// must be exactly their fixed size, and a `Piece` must at least carry
    /// its index and offset.
    pub fn decode(mut frame: Bytes) -> Result<Self, PeerError> {
        if frame.len() < 4 {
            return Err(PeerError::MalformedFrame("missing length prefix".into()));
        }

        let length = frame.get_u32() as usize;
        if length > MAX_FRAME {
            return Err(PeerError::MalformedFrame(format!(
                "frame of {} bytes exceeds bound",
                length
            )));
        }
        if frame.remaining() != length {
            return Err(PeerError::MalformedFrame(format!(
                "length prefix {} does not match payload {}",
                length,
                frame.remaining()
            )));
        }

        if length == 0 {
            return Ok(Message::KeepAlive);
        }

        let id = MessageId::try_from(frame.get_u8())?;
        let payload = length - 1;

        match id {
            MessageId::Choke => Self::expect_empty(payload, Message::Choke),
            MessageId::Unchoke => Self::expect_empty(payload, Message::Unchoke),
            MessageId::Interested => Self::expect_empty(payload, Message::Interested),
            MessageId::NotInterested => Self::expect_empty(payload, Message::NotInterested),
            MessageId::Have => {
                if payload != 4 {
                    return Err(PeerError::MalformedFrame("have payload".into()));
                }
                Ok(Message::Have {
                    piece: frame.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(Message::Bitfield(frame.copy_to_bytes(payload))),
            MessageId::Request => {
                if payload != 12 {
                    return Err(PeerError::MalformedFrame("request payload".into()));
                }
                Ok(Message::Request {
                    index: frame.get_u32(),
                    begin: frame.get_u32(),
                    length: frame.get_u32(),
                })
            }
            MessageId::Piece => {
                if payload < 8 {
                    return Err(PeerError::MalformedFrame("piece payload".into()));
                }
                Ok(Message::Piece {
                    index: frame.get_u32(),
                    begin: frame.get_u32(),
                    data: frame.copy_to_bytes(payload - 8),
                })
            }
            MessageId::Cancel => {
                if payload != 12 {
                    return Err(PeerError::MalformedFrame("cancel payload".into()));
                }
                Ok(Message::Cancel {
                    index: frame.get_u32(),
                    begin: frame.get_u32(),
                    length: frame.get_u32(),
                })
            }
        }
    }

    fn expect_empty(payload: usize, message: Message) -> Result<Message, PeerError> {
        if payload != 0 {
            return Err(PeerError::MalformedFrame(format!(
                "{:?} carries unexpected payload",
                message
            )));
        }
        Ok(message)
    }
}
