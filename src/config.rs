//! Engine configuration.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_PORT, READ_TIMEOUT, TARGET_PEERS_MAX};

/// Options for one download run.
///
/// Everything the engine would otherwise have to reach for ambiently is
/// plumbed through here; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory the torrent's file layout is created under.
    pub output_dir: PathBuf,
    /// Port reported to trackers. The engine is download-only and never
    /// listens on it.
    pub port: u16,
    /// Local address to bind outbound peer connections to.
    pub local_bind: Option<IpAddr>,
    /// Socket read timeout inside session loops.
    pub read_timeout: Duration,
    /// Upper bound for the adaptive peer target.
    pub target_peers_max: usize,
    /// `numwant` sent to trackers; tracker default when `None`.
    pub numwant: Option<u32>,
}

impl EngineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            port: DEFAULT_PORT,
            local_bind: None,
            read_timeout: READ_TIMEOUT,
            target_peers_max: TARGET_PEERS_MAX,
            numwant: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
