use crate::constants::BLOCK_SIZE;
use std::time::Instant;

/// A block the session should request: offset and length within a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub begin: u32,
    pub length: u32,
}

/// Lifecycle of a piece.
///
/// `Missing -> InProgress -> Verified`, with hash failure dropping an
/// assembled piece back to `Missing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    Missing,
    InProgress,
    Verified,
}

/// One 16 KiB (or shorter tail) slot of an in-progress piece.
#[derive(Debug)]
pub(super) struct BlockSlot {
    pub begin: u32,
    pub length: u32,
    pub received: bool,
    pub last_requested: Option<Instant>,
    pub buf: Vec<u8>,
}

/// Per-piece download state.
#[derive(Debug)]
pub(super) struct Piece {
    pub index: u32,
    pub expected_hash: [u8; 20],
    pub expected_size: u32,
    pub status: PieceStatus,
    /// Set while some session is actively requesting this piece.
    pub claimed: bool,
    pub blocks: Vec<BlockSlot>,
    pub received_count: usize,
    pub last_activity: Instant,
}

impl Piece {
    pub fn new(index: u32, expected_hash: [u8; 20], expected_size: u32) -> Self {
        Self {
            index,
            expected_hash,
            expected_size,
            status: PieceStatus::Missing,
            claimed: false,
            blocks: Vec::new(),
            received_count: 0,
            last_activity: Instant::now(),
        }
    }

    /// Allocates the block table and moves the piece to `InProgress`.
    pub fn start(&mut self) {
        debug_assert_eq!(self.status, PieceStatus::Missing);
        let count = self.expected_size.div_ceil(BLOCK_SIZE);
        self.blocks = (0..count)
            .map(|i| {
                let begin = i * BLOCK_SIZE;
                BlockSlot {
                    begin,
                    length: (self.expected_size - begin).min(BLOCK_SIZE),
                    received: false,
                    last_requested: None,
                    buf: Vec::new(),
                }
            })
            .collect();
        self.received_count = 0;
        self.status = PieceStatus::InProgress;
        self.last_activity = Instant::now();
    }

    /// Drops all progress and returns the piece to `Missing`.
    pub fn reset(&mut self) {
        self.blocks = Vec::new();
        self.received_count = 0;
        self.status = PieceStatus::Missing;
        self.claimed = false;
    }

    /// Concatenates the received block buffers in order.
    pub fn assemble(&self) -> Vec<u8> {
        debug_assert_eq!(self.received_count, self.blocks.len());
        let mut data = Vec::with_capacity(self.expected_size as usize);
        for block in &self.blocks {
            data.extend_from_slice(&block.buf);
        }
        data
    }

    /// Frees block buffers after verification; the piece keeps only its
    /// terminal state.
    pub fn finish(&mut self) {
        self.blocks = Vec::new();
        self.status = PieceStatus::Verified;
        self.claimed = false;
    }
}
