//! remora - a download-only BitTorrent engine
//!
//! Given parsed torrent metadata and tracker-supplied peers, the engine
//! drives many concurrent peer wire connections, schedules and verifies
//! pieces, and writes the result into the torrent's file layout.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`metainfo`] - torrent file parsing and info-hash computation
//! - [`tracker`] - HTTP and UDP tracker announces
//! - [`peer`] - peer wire protocol and per-peer download sessions
//! - [`engine`] - piece scheduling, assembly, and SHA-1 verification
//! - [`storage`] - mapping piece writes onto the on-disk file sequence
//! - [`swarm`] - peer pool lifecycle, replenishment, and stall recovery
//! - [`metrics`] - counters and the rolling download-rate estimator
//!
//! # Example
//!
//! ```no_run
//! use remora::{EngineConfig, Metainfo, Swarm};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("example.torrent")?;
//! let metainfo = Metainfo::from_bytes(&data)?;
//!
//! let swarm = Swarm::new(&metainfo, EngineConfig::new("downloads")).await?;
//! swarm.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod bencode;
pub mod config;
pub mod engine;
pub mod metainfo;
pub mod metrics;
pub mod peer;
pub mod storage;
pub mod swarm;
pub mod tracker;

mod constants;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::EngineConfig;
pub use engine::{BlockOutcome, EngineError, PieceEngine};
pub use metainfo::{File, Info, InfoHash, Metainfo, MetainfoError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use peer::{Bitfield, Handshake, Message, PeerError, PeerId, PeerSession};
pub use storage::{FileMapper, StorageError};
pub use swarm::{Swarm, SwarmError};
pub use tracker::{AnnounceResponse, HttpTracker, TrackerError, TrackerEvent, UdpTracker};
