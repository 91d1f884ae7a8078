//! Protocol constants and tuning parameters.
//!
//! Timeouts, window sizes and protocol values used throughout the engine.
//! The tuning values track the behavior of mainstream clients where a
//! default exists (block size, pipeline depth), with the rest sized for a
//! leech-only workload.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &str = "-RM0001-";

/// User agent string for HTTP tracker requests
pub const USER_AGENT: &str = "remora/0.1.0";

/// Default port reported to trackers (the engine never listens on it)
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB), the unit of request/transfer
pub const BLOCK_SIZE: u32 = 16384;

/// Largest message frame the decoder accepts (128KB): a full block plus
/// headers with generous slack for bitfields of very large torrents
pub const MAX_FRAME: usize = 131072;

/// Maximum outstanding block requests per session
pub const PIPELINE_DEPTH: usize = 16;

/// Soft cap on simultaneously in-progress pieces
pub const MAX_IN_PROGRESS: usize = 50;

// ============================================================================
// Timeouts - peer connections
// ============================================================================

/// TCP connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Handshake exchange timeout after TCP connect
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default socket read timeout inside the session loop
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket write timeout
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// A session with no inbound frame for this long is torn down
pub const SESSION_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(90);

/// Consecutive I/O errors before a session gives up
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

// ============================================================================
// Timeouts - block scheduling
// ============================================================================

/// A block request older than this may be re-requested
pub const BLOCK_REQUEST_STALE: Duration = Duration::from_secs(30);

/// A block with no data for this long is force-reissued
pub const BLOCK_FORCE_REISSUE: Duration = Duration::from_secs(60);

/// Upper bound on force reissues in a single burst
pub const MAX_FORCE_REISSUES: usize = 5;

/// No block progress on the current piece for this long triggers a reissue
/// pass from the session loop
pub const PIECE_PROGRESS_TIMEOUT: Duration = Duration::from_secs(10);

/// An in-progress piece untouched for this long is swept back to missing
pub const PIECE_STALE_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Intervals - session keep-alive
// ============================================================================

/// Silence on the wire before we send a keep-alive
pub const KEEPALIVE_AFTER: Duration = Duration::from_secs(30);

/// Silence while choked before we re-send Interested
pub const REINTEREST_AFTER: Duration = Duration::from_secs(15);

// ============================================================================
// Swarm management
// ============================================================================

/// Candidates tried during the initial fill
pub const INITIAL_FILL_CAP: usize = 50;

/// Replenishment loop period
pub const REPLENISH_INTERVAL: Duration = Duration::from_secs(5);

/// New sessions attempted per replenishment round
pub const REPLENISH_BATCH: usize = 3;

/// Adaptive peer-target sampling period
pub const TARGET_ADAPT_INTERVAL: Duration = Duration::from_secs(30);

/// Verified-piece count per sample below which the target is raised
pub const TARGET_RAISE_THRESHOLD: u64 = 5;

/// Verified-piece count per sample above which the target is lowered
pub const TARGET_LOWER_THRESHOLD: u64 = 20;

/// Target increment when progress is slow
pub const TARGET_RAISE_STEP: usize = 5;

/// Target decrement when progress is comfortable
pub const TARGET_LOWER_STEP: usize = 2;

/// Target is never lowered below this
pub const TARGET_FLOOR: usize = 15;

/// Default upper bound on the adaptive peer target
pub const TARGET_PEERS_MAX: usize = 30;

/// Initial adaptive peer target
pub const TARGET_PEERS_INITIAL: usize = 10;

/// Tracker re-announce period
pub const TRACKER_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// No piece verified for this long counts as a stall
pub const SWARM_STALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Aggressive recovery rounds before the swarm is declared stuck
pub const MAX_STALL_ROUNDS: u32 = 3;

/// Extra sessions opened per aggressive recovery round
pub const STALL_EXTRA_SESSIONS: usize = 5;

// ============================================================================
// Metrics
// ============================================================================

/// Rolling rate window length, in one-second samples
pub const RATE_WINDOW: usize = 10;

/// Rate sampling period
pub const RATE_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
