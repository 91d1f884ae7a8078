//! Tracker protocols: HTTP(S) announce (BEP-3) and UDP announce (BEP-15).
//!
//! [`TrackerSet`] walks the primary announce URL and the flattened
//! announce-list alternates until one endpoint responds.

mod client;
mod error;
mod http;
mod udp;

pub mod response;

pub use client::{AnnounceParams, TrackerSet};
pub use error::TrackerError;
pub use http::HttpTracker;
pub use response::{parse_compact_peers, AnnounceResponse, TrackerEvent};
pub use udp::UdpTracker;

#[cfg(test)]
mod tests;
