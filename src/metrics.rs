//! Download counters and a rolling throughput estimator.
//!
//! Counters are plain atomics so sessions and the engine can bump them
//! without coordination; snapshot reads are wait-free. The rate estimator
//! keeps the last ten one-second deltas of `bytes_downloaded` behind a
//! short lock, sampled by the swarm driver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::constants::RATE_WINDOW;

/// Thread-safe engine counters plus the rolling download-rate window.
#[derive(Debug, Default)]
pub struct Metrics {
    bytes_downloaded: AtomicU64,
    pieces_downloaded: AtomicU64,
    pieces_verified: AtomicU64,
    pieces_failed: AtomicU64,
    active_peers: AtomicU64,
    connection_attempts: AtomicU64,
    successful_connections: AtomicU64,
    failed_connections: AtomicU64,
    rate: Mutex<RateWindow>,
}

#[derive(Debug, Default)]
struct RateWindow {
    samples: VecDeque<u64>,
    last_total: u64,
}

/// A point-in-time copy of every counter and the rate estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_downloaded: u64,
    pub pieces_downloaded: u64,
    pub pieces_verified: u64,
    pub pieces_failed: u64,
    pub active_peers: u64,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub failed_connections: u64,
    /// Bytes/s over the most recent sample.
    pub current_rate: u64,
    /// Mean bytes/s over the whole window.
    pub average_rate: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes_downloaded(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_pieces_downloaded(&self) {
        self.pieces_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pieces_verified(&self) {
        self.pieces_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pieces_failed(&self) {
        self.pieces_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_connected(&self) {
        self.active_peers.fetch_add(1, Ordering::Relaxed);
        self.successful_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn peer_disconnected(&self) {
        self.active_peers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_connection_attempts(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_connections(&self) {
        self.failed_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    pub fn pieces_verified(&self) -> u64 {
        self.pieces_verified.load(Ordering::Relaxed)
    }

    pub fn pieces_failed(&self) -> u64 {
        self.pieces_failed.load(Ordering::Relaxed)
    }

    pub fn active_peers(&self) -> u64 {
        self.active_peers.load(Ordering::Relaxed)
    }

    /// Records one rate sample: the delta in `bytes_downloaded` since the
    /// previous call. Meant to be called once per second.
    pub fn sample_rate(&self) {
        let total = self.bytes_downloaded();
        let mut window = self.rate.lock();
        let delta = total.saturating_sub(window.last_total);
        window.last_total = total;
        if window.samples.len() == RATE_WINDOW {
            window.samples.pop_front();
        }
        window.samples.push_back(delta);
    }

    /// Bytes/s over the most recent sample.
    pub fn current_rate(&self) -> u64 {
        self.rate.lock().samples.back().copied().unwrap_or(0)
    }

    /// Mean bytes/s across the rolling window.
    pub fn average_rate(&self) -> u64 {
        let window = self.rate.lock();
        if window.samples.is_empty() {
            return 0;
        }
        window.samples.iter().sum::<u64>() / window.samples.len() as u64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            pieces_downloaded: self.pieces_downloaded.load(Ordering::Relaxed),
            pieces_verified: self.pieces_verified.load(Ordering::Relaxed),
            pieces_failed: self.pieces_failed.load(Ordering::Relaxed),
            active_peers: self.active_peers.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connections: self.successful_connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            current_rate: self.current_rate(),
            average_rate: self.average_rate(),
        }
    }
}
