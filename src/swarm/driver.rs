use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::Rng as _;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::error::SwarmError;
use super::pool::CandidatePool;
use crate::config::EngineConfig;
use crate::constants::{
    INITIAL_FILL_CAP, MAX_STALL_ROUNDS, RATE_SAMPLE_INTERVAL, REPLENISH_BATCH,
    REPLENISH_INTERVAL, STALL_EXTRA_SESSIONS, SWARM_STALL_TIMEOUT, TARGET_ADAPT_INTERVAL,
    TARGET_FLOOR, TARGET_LOWER_STEP, TARGET_LOWER_THRESHOLD, TARGET_PEERS_INITIAL,
    TARGET_RAISE_STEP, TARGET_RAISE_THRESHOLD, TRACKER_REFRESH_INTERVAL,
};
use crate::engine::PieceEngine;
use crate::metainfo::Metainfo;
use crate::metrics::Metrics;
use crate::peer::{PeerId, PeerSession, SessionContext};
use crate::storage::FileMapper;
use crate::tracker::{AnnounceParams, TrackerError, TrackerEvent, TrackerSet};

/// The peer pool for one torrent.
///
/// Owns the candidate addresses, spawns one task per live session, and
/// runs the management loop: replenishment, adaptive target sizing,
/// periodic tracker refresh, and stall recovery. Sessions communicate
/// back only through shared atomics and the engine; the swarm never holds
/// a session reference.
pub struct Swarm {
    ctx: SessionContext,
    metrics: Arc<Metrics>,
    trackers: TrackerSet,
    pool: Mutex<CandidatePool>,
    /// Addresses with a session task alive, for dedup.
    live: Mutex<HashSet<SocketAddr>>,
    active: AtomicUsize,
    target: AtomicUsize,
    target_max: usize,
    port: u16,
    numwant: Option<u32>,
    /// Random announce key, constant for the run.
    announce_key: u32,
}

impl Swarm {
    /// Builds the full engine stack for `metainfo`: output files
    /// (truncated fresh), piece engine, metrics, and tracker set.
    pub async fn new(metainfo: &Metainfo, config: EngineConfig) -> Result<Arc<Self>, SwarmError> {
        let metrics = Arc::new(Metrics::new());
        let mapper = FileMapper::create(&config.output_dir, &metainfo.info).await?;
        let engine = PieceEngine::new(&metainfo.info, mapper, Arc::clone(&metrics));

        let ctx = SessionContext {
            info_hash: metainfo.info_hash,
            peer_id: PeerId::generate(),
            engine,
            shutdown: Arc::new(AtomicBool::new(false)),
            local_bind: config.local_bind,
            read_timeout: config.read_timeout,
        };

        Ok(Arc::new(Self {
            ctx,
            metrics,
            trackers: TrackerSet::new(metainfo.trackers()),
            pool: Mutex::new(CandidatePool::new()),
            live: Mutex::new(HashSet::new()),
            active: AtomicUsize::new(0),
            target: AtomicUsize::new(TARGET_PEERS_INITIAL.min(config.target_peers_max)),
            target_max: config.target_peers_max,
            port: config.port,
            numwant: config.numwant,
            announce_key: rand::rng().random(),
        }))
    }

    pub fn engine(&self) -> &Arc<PieceEngine> {
        &self.ctx.engine
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn active_peers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Seeds peer addresses directly, bypassing the tracker.
    pub fn add_candidates(&self, addrs: impl IntoIterator<Item = SocketAddr>) -> usize {
        self.pool.lock().merge(addrs)
    }

    /// Asks every session and the management loop to wind down.
    pub fn shutdown(&self) {
        self.ctx.shutdown.store(true, Ordering::Release);
    }

    /// Drives the download to completion.
    ///
    /// Announces `started`, fills the initial session set, then loops:
    /// sampling the rate each second, replenishing every 5 s while below
    /// target, adapting the target every 30 s, refreshing the tracker
    /// every 5 min, and opening recovery sessions when verification
    /// stalls for 2 min. Three fruitless recovery rounds end the run.
    pub async fn run(self: Arc<Self>) -> Result<(), SwarmError> {
        self.startup_announce().await?;
        Self::initial_fill(&self).await;

        let mut ticker = tokio::time::interval(RATE_SAMPLE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_replenish = Instant::now();
        let mut last_adapt = Instant::now();
        let mut last_refresh = Instant::now();
        let mut last_verified_at = Instant::now();
        let mut adapt_sample = self.metrics.pieces_verified();
        let mut stall_mark = adapt_sample;
        let mut stall_rounds = 0u32;

        let result = loop {
            ticker.tick().await;

            if self.ctx.engine.is_complete() {
                break Ok(());
            }
            if let Some(message) = self.ctx.engine.fatal_error() {
                break Err(SwarmError::Storage(message));
            }
            if self.ctx.shutdown.load(Ordering::Acquire) {
                break Ok(());
            }

            self.metrics.sample_rate();

            let verified_now = self.metrics.pieces_verified();
            if verified_now > stall_mark {
                stall_mark = verified_now;
                last_verified_at = Instant::now();
                stall_rounds = 0;
            }

            if last_replenish.elapsed() >= REPLENISH_INTERVAL {
                last_replenish = Instant::now();
                if self.active_peers() < self.target.load(Ordering::SeqCst) {
                    Self::spawn_batch(&self, REPLENISH_BATCH);
                }
            }

            if last_adapt.elapsed() >= TARGET_ADAPT_INTERVAL {
                last_adapt = Instant::now();
                let delta = verified_now - adapt_sample;
                adapt_sample = verified_now;
                let current = self.target.load(Ordering::SeqCst);
                let next = next_target(current, delta, self.target_max);
                if next != current {
                    debug!(current, next, verified_delta = delta, "adjusting peer target");
                    self.target.store(next, Ordering::SeqCst);
                }
            }

            if !self.trackers.is_empty() && last_refresh.elapsed() >= TRACKER_REFRESH_INTERVAL {
                last_refresh = Instant::now();
                match self
                    .trackers
                    .announce(self.announce_params(TrackerEvent::None))
                    .await
                {
                    Ok(response) => {
                        let added = self.pool.lock().merge(response.peers);
                        debug!(added, "tracker refresh merged peers");
                    }
                    Err(e) => warn!("tracker refresh failed: {}", e),
                }
            }

            if last_verified_at.elapsed() >= SWARM_STALL_TIMEOUT {
                if stall_rounds >= MAX_STALL_ROUNDS {
                    break Err(SwarmError::Stalled(stall_rounds));
                }
                stall_rounds += 1;
                warn!(round = stall_rounds, "no piece verified recently, opening extra sessions");
                Self::spawn_batch(&self, STALL_EXTRA_SESSIONS);
                last_verified_at = Instant::now();
            }
        };

        self.ctx.shutdown.store(true, Ordering::Release);

        if result.is_ok() {
            self.ctx
                .engine
                .sync_storage()
                .await
                .map_err(|e| SwarmError::Storage(e.to_string()))?;
            if !self.trackers.is_empty() {
                // Best effort; the download is already on disk.
                let _ = self
                    .trackers
                    .announce(self.announce_params(TrackerEvent::Completed))
                    .await;
            }
            info!(
                pieces = self.ctx.engine.piece_count(),
                bytes = self.metrics.bytes_downloaded(),
                "download complete"
            );
        }

        result
    }

    /// Announces `started` and seeds the pool.
    ///
    /// A failed walk is fatal only when there are no seeded candidates to
    /// fall back on.
    async fn startup_announce(&self) -> Result<(), SwarmError> {
        if self.trackers.is_empty() {
            if self.pool.lock().remaining() == 0 {
                return Err(SwarmError::AllTrackersUnreachable(
                    TrackerError::AllEndpointsFailed,
                ));
            }
            return Ok(());
        }

        match self
            .trackers
            .announce(self.announce_params(TrackerEvent::Started))
            .await
        {
            Ok(response) => {
                let added = self.pool.lock().merge(response.peers);
                info!(
                    peers = added,
                    seeders = response.complete,
                    leechers = response.incomplete,
                    "initial tracker announce"
                );
                Ok(())
            }
            Err(e) if self.pool.lock().remaining() > 0 => {
                warn!("startup announce failed, using seeded candidates: {}", e);
                Ok(())
            }
            Err(e) => Err(SwarmError::AllTrackersUnreachable(e)),
        }
    }

    /// Tries candidates until one session is live or the pool (or the
    /// attempt cap) runs out.
    async fn initial_fill(swarm: &Arc<Self>) {
        let mut tried = 0;
        while tried < INITIAL_FILL_CAP
            && swarm.active_peers() == 0
            && swarm.pool.lock().remaining() > 0
            && !swarm.ctx.engine.is_complete()
        {
            tried += Self::spawn_batch(swarm, REPLENISH_BATCH + 2);
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    /// Draws up to `count` random candidates and spawns sessions for them.
    fn spawn_batch(swarm: &Arc<Self>, count: usize) -> usize {
        let mut spawned = 0;
        for _ in 0..count {
            let Some(addr) = swarm.pool.lock().draw() else {
                break;
            };
            if Self::spawn_session(swarm, addr) {
                spawned += 1;
            }
        }
        spawned
    }

    /// Spawns the session task for one address. Returns false when the
    /// address already has a live session or shutdown is in progress.
    fn spawn_session(swarm: &Arc<Self>, addr: SocketAddr) -> bool {
        if swarm.ctx.shutdown.load(Ordering::Acquire) {
            return false;
        }
        if !swarm.live.lock().insert(addr) {
            return false;
        }

        swarm.metrics.inc_connection_attempts();
        let swarm = Arc::clone(swarm);
        tokio::spawn(async move {
            match PeerSession::connect(addr, swarm.ctx.clone()).await {
                Ok(mut session) => {
                    debug!(%addr, "session established");
                    swarm.metrics.peer_connected();
                    swarm.active.fetch_add(1, Ordering::SeqCst);

                    if let Err(e) = session.run().await {
                        debug!(%addr, "session ended: {}", e);
                    }

                    swarm.active.fetch_sub(1, Ordering::SeqCst);
                    swarm.metrics.peer_disconnected();
                }
                Err(e) => {
                    swarm.metrics.inc_failed_connections();
                    debug!(%addr, "connection failed: {}", e);
                }
            }
            swarm.live.lock().remove(&addr);
        });
        true
    }

    fn announce_params(&self, event: TrackerEvent) -> AnnounceParams {
        let left = self.ctx.engine.bytes_left();
        AnnounceParams {
            info_hash: *self.ctx.info_hash.as_bytes(),
            peer_id: *self.ctx.peer_id.as_bytes(),
            port: self.port,
            uploaded: 0,
            downloaded: self.ctx.engine.total_length() - left,
            left,
            event,
            numwant: self.numwant,
            key: Some(self.announce_key),
            trackerid: None,
        }
    }
}

/// The adaptive peer target: fewer than 5 pieces verified in a sample
/// raises the target by 5 (capped), more than 20 with a target above 15
/// lowers it by 2.
pub(super) fn next_target(current: usize, verified_delta: u64, max: usize) -> usize {
    if verified_delta < TARGET_RAISE_THRESHOLD {
        (current + TARGET_RAISE_STEP).min(max)
    } else if verified_delta > TARGET_LOWER_THRESHOLD && current > TARGET_FLOOR {
        current - TARGET_LOWER_STEP
    } else {
        current
    }
}
