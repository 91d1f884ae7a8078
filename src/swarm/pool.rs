use rand::Rng as _;
use std::collections::HashSet;
use std::net::SocketAddr;

/// Unused peer addresses from tracker responses.
///
/// Deduplicates across merges by address, including addresses already
/// drawn, so a peer handed out once never re-enters the pool. Draws are
/// uniformly random to spread connection attempts across the swarm.
#[derive(Debug, Default)]
pub struct CandidatePool {
    unused: Vec<SocketAddr>,
    seen: HashSet<SocketAddr>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds unseen addresses; returns how many were new.
    pub fn merge(&mut self, addrs: impl IntoIterator<Item = SocketAddr>) -> usize {
        let mut added = 0;
        for addr in addrs {
            if self.seen.insert(addr) {
                self.unused.push(addr);
                added += 1;
            }
        }
        added
    }

    /// Removes and returns a uniformly random unused candidate.
    pub fn draw(&mut self) -> Option<SocketAddr> {
        if self.unused.is_empty() {
            return None;
        }
        let at = rand::rng().random_range(0..self.unused.len());
        Some(self.unused.swap_remove(at))
    }

    /// Number of unused candidates.
    pub fn remaining(&self) -> usize {
        self.unused.len()
    }
}
