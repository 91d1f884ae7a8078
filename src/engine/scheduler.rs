use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::error::EngineError;
use super::piece::{BlockRequest, Piece, PieceStatus};
use crate::constants::{
    BLOCK_FORCE_REISSUE, BLOCK_REQUEST_STALE, MAX_FORCE_REISSUES, MAX_IN_PROGRESS,
    PIECE_STALE_TIMEOUT, PIPELINE_DEPTH,
};
use crate::metainfo::Info;
use crate::metrics::Metrics;
use crate::peer::Bitfield;
use crate::storage::FileMapper;

/// What became of a block handed to [`PieceEngine::on_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Stored; the piece still has blocks outstanding.
    Accepted,
    /// The block was already received.
    Duplicate,
    /// The block matched no outstanding slot (already-verified piece,
    /// unknown index, or bad offset/length).
    Ignored,
    /// The block completed its piece. `verified` tells whether the hash
    /// matched; on `false` the piece was reset for re-download.
    Complete { index: u32, verified: bool },
}

/// Piece and block scheduling for one torrent.
///
/// Mutators take one table lock, so sessions on different tasks can call
/// in concurrently; the longest critical section is assembling and
/// hashing a single piece. Disk writes happen outside the lock: the
/// written piece is fully received and still claimed, so nothing else can
/// touch it in the window.
pub struct PieceEngine {
    table: Mutex<PieceTable>,
    mapper: FileMapper,
    metrics: Arc<Metrics>,
    complete: AtomicBool,
    fatal: Mutex<Option<String>>,
    piece_count: usize,
    total_length: u64,
}

struct PieceTable {
    pieces: Vec<Piece>,
    in_progress: usize,
    verified: usize,
}

impl PieceEngine {
    pub fn new(info: &Info, mapper: FileMapper, metrics: Arc<Metrics>) -> Arc<Self> {
        let pieces = info
            .pieces
            .iter()
            .enumerate()
            .map(|(i, hash)| Piece::new(i as u32, *hash, info.piece_size(i as u32) as u32))
            .collect();

        Arc::new(Self {
            table: Mutex::new(PieceTable {
                pieces,
                in_progress: 0,
                verified: 0,
            }),
            mapper,
            metrics,
            complete: AtomicBool::new(false),
            fatal: Mutex::new(None),
            piece_count: info.piece_count(),
            total_length: info.total_length,
        })
    }

    /// Total number of pieces.
    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Total byte length of the torrent.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// True once every piece is verified. A piece's Verified transition
    /// happens-before this returns true for it.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Number of verified pieces.
    pub fn downloaded_count(&self) -> usize {
        self.table.lock().verified
    }

    /// Bytes not yet verified, for tracker `left` reporting.
    pub fn bytes_left(&self) -> u64 {
        let table = self.table.lock();
        table
            .pieces
            .iter()
            .filter(|p| p.status != PieceStatus::Verified)
            .map(|p| u64::from(p.expected_size))
            .sum()
    }

    /// A latched fatal storage failure, if any write has failed.
    pub fn fatal_error(&self) -> Option<String> {
        self.fatal.lock().clone()
    }

    /// Picks a piece worth starting or helping with.
    ///
    /// Missing pieces are preferred, chosen uniformly at random among
    /// those the peer has (all of them when `peer_pieces` is `None`).
    /// Failing that, an unclaimed in-progress piece with the fewest
    /// received blocks is offered so stragglers get finished. `None` when
    /// nothing is eligible.
    pub fn next_needed_piece(&self, peer_pieces: Option<&Bitfield>) -> Option<u32> {
        let table = self.table.lock();
        let peer_has =
            |index: u32| peer_pieces.map_or(true, |bitfield| bitfield.has(index as usize));

        let missing: Vec<u32> = table
            .pieces
            .iter()
            .filter(|p| p.status == PieceStatus::Missing && peer_has(p.index))
            .map(|p| p.index)
            .collect();
        if let Some(&index) = missing.choose(&mut rand::rng()) {
            return Some(index);
        }

        table
            .pieces
            .iter()
            .filter(|p| p.status == PieceStatus::InProgress && !p.claimed && peer_has(p.index))
            .min_by_key(|p| p.received_count)
            .map(|p| p.index)
    }

    /// Claims `index` for the calling session.
    ///
    /// A Missing piece gets its block table and becomes InProgress; an
    /// unclaimed InProgress piece is re-adopted with its progress intact.
    /// When the in-progress cap is hit, stale pieces (no activity for two
    /// minutes) are swept back to Missing before giving up.
    pub fn begin_piece(&self, index: u32) -> Result<(), EngineError> {
        let mut table = self.table.lock();

        let position = index as usize;
        if position >= table.pieces.len() {
            return Err(EngineError::UnknownPiece(index));
        }

        match table.pieces[position].status {
            PieceStatus::Verified => Err(EngineError::Unavailable(index)),
            PieceStatus::InProgress => {
                let piece = &mut table.pieces[position];
                if piece.claimed {
                    return Err(EngineError::Unavailable(index));
                }
                piece.claimed = true;
                piece.last_activity = Instant::now();
                Ok(())
            }
            PieceStatus::Missing => {
                if table.in_progress >= MAX_IN_PROGRESS {
                    let swept = sweep_stale(&mut table);
                    if swept > 0 {
                        debug!(swept, "swept stale pieces back to missing");
                    }
                    if table.in_progress >= MAX_IN_PROGRESS {
                        return Err(EngineError::TooManyInProgress);
                    }
                }
                let piece = &mut table.pieces[position];
                piece.start();
                piece.claimed = true;
                table.in_progress += 1;
                Ok(())
            }
        }
    }

    /// Clears request stamps on the unreceived blocks of `index`.
    ///
    /// A peer that chokes us discards its request queue, so those blocks
    /// must become re-requestable immediately rather than after the
    /// stale-request timeout.
    pub fn reset_requests(&self, index: u32) {
        let mut table = self.table.lock();
        if let Some(piece) = table.pieces.get_mut(index as usize) {
            for block in piece.blocks.iter_mut().filter(|b| !b.received) {
                block.last_requested = None;
            }
        }
    }

    /// Releases a session's claim, keeping any received blocks.
    pub fn release_piece(&self, index: u32) {
        let mut table = self.table.lock();
        if let Some(piece) = table.pieces.get_mut(index as usize) {
            if piece.status == PieceStatus::InProgress {
                piece.claimed = false;
            }
        }
    }

    /// Up to `limit` (capped at the pipeline depth) blocks of `index`
    /// that are unreceived and not recently requested, each stamped with
    /// the current time.
    pub fn blocks_to_request(&self, index: u32, limit: usize) -> Vec<BlockRequest> {
        let now = Instant::now();
        let mut table = self.table.lock();
        let Some(piece) = table.pieces.get_mut(index as usize) else {
            return Vec::new();
        };
        if piece.status != PieceStatus::InProgress {
            return Vec::new();
        }

        piece.last_activity = now;
        piece
            .blocks
            .iter_mut()
            .filter(|b| {
                !b.received
                    && b.last_requested
                        .map_or(true, |at| now.duration_since(at) >= BLOCK_REQUEST_STALE)
            })
            .take(limit.min(PIPELINE_DEPTH))
            .map(|b| {
                b.last_requested = Some(now);
                BlockRequest {
                    begin: b.begin,
                    length: b.length,
                }
            })
            .collect()
    }

    /// Blocks of `index` that have been outstanding for a minute with no
    /// data, restamped for one more attempt. At most five per call.
    pub fn force_reissue(&self, index: u32) -> Vec<BlockRequest> {
        let now = Instant::now();
        let mut table = self.table.lock();
        let Some(piece) = table.pieces.get_mut(index as usize) else {
            return Vec::new();
        };
        if piece.status != PieceStatus::InProgress {
            return Vec::new();
        }

        piece
            .blocks
            .iter_mut()
            .filter(|b| {
                !b.received
                    && b.last_requested
                        .is_some_and(|at| now.duration_since(at) >= BLOCK_FORCE_REISSUE)
            })
            .take(MAX_FORCE_REISSUES)
            .map(|b| {
                b.last_requested = Some(now);
                BlockRequest {
                    begin: b.begin,
                    length: b.length,
                }
            })
            .collect()
    }

    /// Stores one received block and, when it completes its piece,
    /// verifies and persists the piece.
    ///
    /// Assembly and hashing run under the table lock; the write to disk
    /// runs after it is released. A hash mismatch resets the piece to
    /// Missing and reports `Complete { verified: false }` — that is
    /// recovery, not an error. A write failure is latched as fatal.
    pub async fn on_block(
        &self,
        index: u32,
        begin: u32,
        data: &[u8],
    ) -> Result<BlockOutcome, EngineError> {
        let assembled = {
            let mut table = self.table.lock();
            let Some(piece) = table.pieces.get_mut(index as usize) else {
                return Ok(BlockOutcome::Ignored);
            };
            if piece.status != PieceStatus::InProgress {
                return Ok(BlockOutcome::Ignored);
            }
            let Some(slot) = piece.blocks.iter_mut().find(|b| b.begin == begin) else {
                return Ok(BlockOutcome::Ignored);
            };
            if slot.length as usize != data.len() {
                return Ok(BlockOutcome::Ignored);
            }
            if slot.received {
                return Ok(BlockOutcome::Duplicate);
            }

            slot.buf = data.to_vec();
            slot.received = true;
            piece.received_count += 1;
            piece.last_activity = Instant::now();
            self.metrics.add_bytes_downloaded(data.len() as u64);

            if piece.received_count < piece.blocks.len() {
                return Ok(BlockOutcome::Accepted);
            }

            self.metrics.inc_pieces_downloaded();
            let assembled = piece.assemble();

            let mut hasher = Sha1::new();
            hasher.update(&assembled);
            let hash: [u8; 20] = hasher.finalize().into();

            if hash != piece.expected_hash {
                warn!(piece = index, "piece failed hash verification, resetting");
                piece.reset();
                table.in_progress -= 1;
                self.metrics.inc_pieces_failed();
                return Ok(BlockOutcome::Complete {
                    index,
                    verified: false,
                });
            }

            assembled
        };

        if let Err(e) = self.mapper.write(index, 0, &assembled).await {
            *self.fatal.lock() = Some(e.to_string());
            return Err(EngineError::Storage(e));
        }

        let mut table = self.table.lock();
        // The piece was claimed and fully received across the write, so it
        // is normally still InProgress here; a stale sweep during a
        // pathologically slow write may have moved it, so go by the status
        // actually observed.
        let status = table.pieces[index as usize].status;
        if status != PieceStatus::Verified {
            table.pieces[index as usize].finish();
            if status == PieceStatus::InProgress {
                table.in_progress -= 1;
            }
            table.verified += 1;
            self.metrics.inc_pieces_verified();
            debug!(
                piece = index,
                verified = table.verified,
                total = self.piece_count,
                "piece verified"
            );
            if table.verified == self.piece_count {
                self.complete.store(true, Ordering::Release);
            }
        }

        Ok(BlockOutcome::Complete {
            index,
            verified: true,
        })
    }

    /// Flushes the output files.
    pub async fn sync_storage(&self) -> Result<(), EngineError> {
        self.mapper.sync_all().await.map_err(EngineError::from)
    }

    /// Reads a piece back from disk (verification-style checks in tests
    /// and callers).
    pub async fn read_piece(&self, index: u32) -> Result<bytes::Bytes, EngineError> {
        self.mapper.read_piece(index).await.map_err(EngineError::from)
    }
}

/// Returns every stale in-progress piece to Missing. Stale claimed pieces
/// are swept too: a claim with no activity for two minutes belongs to a
/// wedged session.
fn sweep_stale(table: &mut PieceTable) -> usize {
    let now = Instant::now();
    let mut swept = 0;
    for piece in &mut table.pieces {
        if piece.status == PieceStatus::InProgress
            && now.duration_since(piece.last_activity) >= PIECE_STALE_TIMEOUT
        {
            piece.reset();
            table.in_progress -= 1;
            swept += 1;
        }
    }
    swept
}
