use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Announce events, reported so the tracker can keep swarm statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Periodic re-announce; no event parameter is sent.
    None,
    Started,
    Stopped,
    Completed,
}

impl TrackerEvent {
    /// The HTTP query value; empty means the parameter is omitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerEvent::None => "",
            TrackerEvent::Started => "started",
            TrackerEvent::Stopped => "stopped",
            TrackerEvent::Completed => "completed",
        }
    }

    /// The numeric event id in UDP announce requests.
    pub fn as_udp_id(&self) -> u32 {
        match self {
            TrackerEvent::None => 0,
            TrackerEvent::Completed => 1,
            TrackerEvent::Started => 2,
            TrackerEvent::Stopped => 3,
        }
    }
}

/// A successful announce.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds to wait before the next regular announce.
    pub interval: u32,
    /// Floor under client-chosen re-announce intervals, when given.
    pub min_interval: Option<u32>,
    /// Seeder count, when given.
    pub complete: Option<u32>,
    /// Leecher count, when given.
    pub incomplete: Option<u32>,
    /// Peer addresses parsed from the compact blob (or dict list).
    pub peers: Vec<SocketAddr>,
    pub warning_message: Option<String>,
    /// Opaque id to echo in subsequent announces, when given.
    pub tracker_id: Option<String>,
}

impl AnnounceResponse {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            min_interval: None,
            complete: None,
            incomplete: None,
            peers: Vec::new(),
            warning_message: None,
            tracker_id: None,
        }
    }
}

/// Parses a compact peer blob: 6-byte records of IPv4 address plus
/// big-endian port. A trailing partial record is ignored.
pub fn parse_compact_peers(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(6)
        .map(|record| {
            let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
            let port = u16::from_be_bytes([record[4], record[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}
