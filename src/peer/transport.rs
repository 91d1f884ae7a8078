use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};
use crate::constants::{MAX_FRAME, WRITE_TIMEOUT};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Framed transport over one peer TCP connection.
///
/// Reads accumulate into an internal buffer until a complete frame
/// (`4 + length` bytes) is available, so short reads never tear a frame;
/// a timed-out read leaves partial bytes buffered for the next call. The
/// socket closes when the transport is dropped.
pub struct PeerTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    read_timeout: Duration,
}

impl PeerTransport {
    pub fn new(stream: TcpStream, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
            read_timeout,
        }
    }

    /// Pulls more bytes off the socket into the buffer.
    ///
    /// Distinguishes a clean close (empty buffer) from a close mid-frame.
    async fn fill(&mut self) -> Result<(), PeerError> {
        let n = timeout(self.read_timeout, self.stream.read_buf(&mut self.read_buf))
            .await
            .map_err(|_| PeerError::Timeout)??;
        if n == 0 {
            if self.read_buf.is_empty() {
                return Err(PeerError::ConnectionClosed);
            }
            return Err(PeerError::MalformedFrame("stream closed mid-frame".into()));
        }
        Ok(())
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        while self.read_buf.len() < HANDSHAKE_LEN {
            self.fill().await?;
        }
        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    /// Reads the next complete frame and decodes it.
    ///
    /// Consumes exactly `4 + length` bytes from the stream per frame. The
    /// frame bound is enforced as soon as the prefix is readable, before
    /// any payload is awaited.
    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        while self.read_buf.len() < 4 {
            self.fill().await?;
        }

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_FRAME {
            return Err(PeerError::MalformedFrame(format!(
                "frame of {} bytes exceeds bound",
                length
            )));
        }

        let total = 4 + length;
        while self.read_buf.len() < total {
            self.fill().await?;
        }

        Message::decode(self.read_buf.split_to(total).freeze())
    }
}
