use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::bitfield::Bitfield;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use super::transport::PeerTransport;
use crate::constants::{
    CONNECT_TIMEOUT, HANDSHAKE_TIMEOUT, KEEPALIVE_AFTER, MAX_CONSECUTIVE_ERRORS,
    PIECE_PROGRESS_TIMEOUT, PIPELINE_DEPTH, REINTEREST_AFTER, SESSION_INACTIVITY_TIMEOUT,
};
use crate::engine::{BlockOutcome, EngineError, PieceEngine};
use crate::metainfo::InfoHash;

/// Everything a session needs from its surroundings. Cheap to clone; one
/// copy goes to each spawned session.
#[derive(Clone)]
pub struct SessionContext {
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub engine: Arc<PieceEngine>,
    pub shutdown: Arc<AtomicBool>,
    /// Local address to bind outbound connects to, when configured.
    pub local_bind: Option<IpAddr>,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ChokeState {
    am_choked: bool,
    am_interested: bool,
    peer_choked: bool,
    peer_interested: bool,
}

impl Default for ChokeState {
    fn default() -> Self {
        Self {
            am_choked: true,
            am_interested: false,
            peer_choked: true,
            peer_interested: false,
        }
    }
}

/// One outbound peer connection running the download state machine.
///
/// The session suspends only on its own socket. Its claimed piece is
/// released on every exit path (via `Drop`), so another session can adopt
/// the piece with whatever progress it made.
pub struct PeerSession {
    addr: SocketAddr,
    transport: PeerTransport,
    ctx: SessionContext,
    choke: ChokeState,
    peer_pieces: Bitfield,
    current_piece: Option<u32>,
    last_frame_at: Instant,
    last_block_at: Instant,
    last_keepalive_at: Instant,
    last_interest_at: Instant,
    consecutive_errors: u32,
    inflight: usize,
}

impl PeerSession {
    /// Connects and exchanges handshakes.
    ///
    /// The connect has a 5 s budget and the handshake a 10 s budget; the
    /// logged elapsed time tells a slow peer from a hostile one.
    pub async fn connect(addr: SocketAddr, ctx: SessionContext) -> Result<Self, PeerError> {
        let started = Instant::now();
        let stream = timeout(CONNECT_TIMEOUT, Self::open_stream(addr, ctx.local_bind))
            .await
            .map_err(|_| PeerError::Timeout)??;

        let mut transport = PeerTransport::new(stream, ctx.read_timeout);
        let ours = Handshake::new(*ctx.info_hash.as_bytes(), *ctx.peer_id.as_bytes());
        transport.send_handshake(&ours).await?;

        let theirs = match timeout(HANDSHAKE_TIMEOUT, transport.receive_handshake()).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(%addr, elapsed = ?started.elapsed(), "handshake timed out");
                return Err(PeerError::Timeout);
            }
        };

        if theirs.info_hash != *ctx.info_hash.as_bytes() {
            debug!(%addr, elapsed = ?started.elapsed(), "handshake info hash mismatch");
            return Err(PeerError::HandshakeMismatch("info hash"));
        }
        trace!(%addr, peer_id = ?PeerId::from_bytes(&theirs.peer_id), "handshake complete");

        let piece_count = ctx.engine.piece_count();
        let now = Instant::now();
        Ok(Self {
            addr,
            transport,
            ctx,
            choke: ChokeState::default(),
            peer_pieces: Bitfield::new(piece_count),
            current_piece: None,
            last_frame_at: now,
            last_block_at: now,
            last_keepalive_at: now,
            last_interest_at: now,
            consecutive_errors: 0,
            inflight: 0,
        })
    }

    async fn open_stream(addr: SocketAddr, bind: Option<IpAddr>) -> Result<TcpStream, PeerError> {
        match bind {
            None => Ok(TcpStream::connect(addr).await?),
            Some(ip) => {
                let socket = match ip {
                    IpAddr::V4(_) => TcpSocket::new_v4()?,
                    IpAddr::V6(_) => TcpSocket::new_v6()?,
                };
                socket.bind(SocketAddr::new(ip, 0))?;
                Ok(socket.connect(addr).await?)
            }
        }
    }

    /// Runs the session to completion.
    ///
    /// Ends when the download completes, shutdown is flagged, the peer is
    /// silent for 90 s, an unrecoverable frame arrives, or I/O fails five
    /// times in a row. The return value is informational; the caller just
    /// replaces the session.
    pub async fn run(&mut self) -> Result<(), PeerError> {
        self.send(Message::Interested).await?;
        self.choke.am_interested = true;
        self.last_interest_at = Instant::now();

        loop {
            if self.ctx.engine.is_complete() || self.ctx.shutdown.load(Ordering::Acquire) {
                return Ok(());
            }
            if self.last_frame_at.elapsed() >= SESSION_INACTIVITY_TIMEOUT {
                debug!(addr = %self.addr, "peer inactive, closing session");
                return Ok(());
            }

            let step = match self.transport.receive_message().await {
                Ok(message) => {
                    self.consecutive_errors = 0;
                    self.last_frame_at = Instant::now();
                    self.handle_message(message).await
                }
                // No frame inside the read timeout: run the idle duties.
                Err(PeerError::Timeout) => self.on_idle().await,
                Err(e) => Err(e),
            };

            match step {
                Ok(()) => {}
                Err(PeerError::Io(e)) => {
                    self.consecutive_errors += 1;
                    warn!(
                        addr = %self.addr,
                        errors = self.consecutive_errors,
                        "session io error: {}",
                        e
                    );
                    if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(PeerError::Io(e));
                    }
                }
                Err(fatal) => {
                    debug!(addr = %self.addr, "session ending: {}", fatal);
                    return Err(fatal);
                }
            }
        }
    }

    /// Duties performed when a read times out with no frame.
    async fn on_idle(&mut self) -> Result<(), PeerError> {
        let silent = self.last_frame_at.elapsed();

        if silent >= KEEPALIVE_AFTER && self.last_keepalive_at.elapsed() >= KEEPALIVE_AFTER {
            trace!(addr = %self.addr, "sending keep-alive");
            self.send(Message::KeepAlive).await?;
            self.last_keepalive_at = Instant::now();
        }

        // Some peers silently drop interest state; remind them.
        if self.choke.am_choked
            && silent >= REINTEREST_AFTER
            && self.last_interest_at.elapsed() >= REINTEREST_AFTER
        {
            trace!(addr = %self.addr, "re-sending interested");
            self.send(Message::Interested).await?;
            self.last_interest_at = Instant::now();
        }

        if !self.choke.am_choked {
            if let Some(piece) = self.current_piece {
                if self.last_block_at.elapsed() >= PIECE_PROGRESS_TIMEOUT {
                    self.reissue_requests(piece).await?;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), PeerError> {
        match message {
            Message::Choke => {
                trace!(addr = %self.addr, "choked");
                // Keep current_piece; progress resumes after unchoke. The
                // peer dropped our request queue, so the pipeline restarts
                // from zero with fresh stamps.
                self.choke.am_choked = true;
                self.inflight = 0;
                if let Some(piece) = self.current_piece {
                    self.ctx.engine.reset_requests(piece);
                }
            }
            Message::Unchoke => {
                trace!(addr = %self.addr, "unchoked");
                self.choke.am_choked = false;
                match self.current_piece {
                    Some(piece) => self.request_blocks(piece).await?,
                    None => self.adopt_piece().await?,
                }
            }
            Message::Have { piece } => {
                self.peer_pieces.set(piece as usize);
                if !self.choke.am_choked && self.current_piece.is_none() {
                    self.try_adopt(piece).await?;
                }
            }
            Message::Bitfield(bits) => {
                let piece_count = self.ctx.engine.piece_count();
                self.peer_pieces = Bitfield::from_bytes(bits, piece_count);
                trace!(
                    addr = %self.addr,
                    pieces = self.peer_pieces.count(),
                    "received bitfield"
                );
                if !self.choke.am_choked && self.current_piece.is_none() {
                    self.adopt_piece().await?;
                }
            }
            Message::Piece { index, begin, data } => {
                self.on_piece(index, begin, &data).await?;
            }
            Message::KeepAlive => trace!(addr = %self.addr, "keep-alive"),
            Message::Interested => {
                trace!(addr = %self.addr, "peer interested (not serving)");
                self.choke.peer_interested = true;
            }
            Message::NotInterested => {
                self.choke.peer_interested = false;
            }
            // Download-only: requests are acknowledged in the log and
            // never served.
            Message::Request { index, .. } => {
                trace!(addr = %self.addr, piece = index, "ignoring block request");
            }
            Message::Cancel { .. } => trace!(addr = %self.addr, "ignoring cancel"),
        }
        Ok(())
    }

    async fn on_piece(&mut self, index: u32, begin: u32, data: &[u8]) -> Result<(), PeerError> {
        self.inflight = self.inflight.saturating_sub(1);
        self.last_block_at = Instant::now();

        match self.ctx.engine.on_block(index, begin, data).await? {
            BlockOutcome::Accepted => {
                if self.current_piece == Some(index) && !self.choke.am_choked {
                    self.request_blocks(index).await?;
                }
            }
            BlockOutcome::Duplicate => {
                trace!(addr = %self.addr, piece = index, begin, "duplicate block");
            }
            BlockOutcome::Ignored => {
                debug!(addr = %self.addr, piece = index, begin, "ignored block");
            }
            BlockOutcome::Complete { index, verified } => {
                if !verified {
                    warn!(addr = %self.addr, piece = index, "piece failed verification");
                }
                if self.current_piece == Some(index) {
                    self.current_piece = None;
                    self.inflight = 0;
                }
                if !self.choke.am_choked {
                    self.adopt_piece().await?;
                }
            }
        }
        Ok(())
    }

    /// Claims a specific piece if the engine still needs it.
    async fn try_adopt(&mut self, piece: u32) -> Result<(), PeerError> {
        match self.ctx.engine.begin_piece(piece) {
            Ok(()) => {
                self.current_piece = Some(piece);
                self.request_blocks(piece).await
            }
            Err(EngineError::Storage(e)) => Err(EngineError::Storage(e).into()),
            // Verified, claimed elsewhere, or the cap is hit: skip.
            Err(_) => Ok(()),
        }
    }

    /// Picks and claims the next piece: preferably one the peer has,
    /// falling back to any needed piece.
    async fn adopt_piece(&mut self) -> Result<(), PeerError> {
        // Bounded retries absorb claim races with other sessions.
        for _ in 0..4 {
            let engine = &self.ctx.engine;
            let Some(pick) = engine
                .next_needed_piece(Some(&self.peer_pieces))
                .or_else(|| engine.next_needed_piece(None))
            else {
                return Ok(());
            };

            match engine.begin_piece(pick) {
                Ok(()) => {
                    trace!(addr = %self.addr, piece = pick, "adopted piece");
                    self.current_piece = Some(pick);
                    return self.request_blocks(pick).await;
                }
                Err(EngineError::Unavailable(_)) => continue,
                Err(EngineError::Storage(e)) => return Err(EngineError::Storage(e).into()),
                Err(_) => return Ok(()),
            }
        }
        Ok(())
    }

    /// Tops the request pipeline up to its depth.
    async fn request_blocks(&mut self, piece: u32) -> Result<(), PeerError> {
        if self.choke.am_choked {
            return Ok(());
        }
        let room = PIPELINE_DEPTH.saturating_sub(self.inflight);
        if room == 0 {
            return Ok(());
        }

        let blocks = self.ctx.engine.blocks_to_request(piece, room);
        for block in &blocks {
            self.send(Message::Request {
                index: piece,
                begin: block.begin,
                length: block.length,
            })
            .await?;
        }
        self.inflight += blocks.len();
        Ok(())
    }

    /// Re-requests stale blocks of a stalled piece, plus a bounded burst
    /// of force reissues for blocks dark for a minute.
    async fn reissue_requests(&mut self, piece: u32) -> Result<(), PeerError> {
        let engine = &self.ctx.engine;
        let mut blocks = engine.blocks_to_request(piece, PIPELINE_DEPTH);
        for forced in engine.force_reissue(piece) {
            if !blocks.contains(&forced) {
                blocks.push(forced);
            }
        }
        if blocks.is_empty() {
            return Ok(());
        }

        debug!(
            addr = %self.addr,
            piece,
            count = blocks.len(),
            "reissuing block requests"
        );
        for block in &blocks {
            self.send(Message::Request {
                index: piece,
                begin: block.begin,
                length: block.length,
            })
            .await?;
        }
        // The old pipeline is presumed lost; account only what was just sent.
        self.inflight = blocks.len();
        Ok(())
    }

    async fn send(&mut self, message: Message) -> Result<(), PeerError> {
        self.transport.send_message(&message).await
    }

    /// The remote address this session is connected to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        if let Some(piece) = self.current_piece {
            self.ctx.engine.release_piece(piece);
        }
    }
}
