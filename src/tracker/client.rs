use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::{AnnounceResponse, TrackerEvent};
use super::udp::UdpTracker;

/// The full announce request parameter set (BEP-3 + common extensions).
#[derive(Debug, Clone)]
pub struct AnnounceParams {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: TrackerEvent,
    /// Number of peers wanted; the tracker default when `None`.
    pub numwant: Option<u32>,
    /// Random key identifying this client across IP changes.
    pub key: Option<u32>,
    /// `trackerid` echoed from a previous response.
    pub trackerid: Option<String>,
}

/// A set of tracker endpoints walked in order until one answers.
///
/// The endpoint list is the primary `announce` URL followed by the
/// flattened `announce-list`. A `tracker id` returned by any endpoint is
/// remembered and echoed on subsequent announces.
pub struct TrackerSet {
    endpoints: Vec<String>,
    trackerid: Mutex<Option<String>>,
}

impl TrackerSet {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            trackerid: Mutex::new(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Announces to the first endpoint that answers.
    ///
    /// Per-endpoint failures are logged and skipped; only when every
    /// endpoint fails does the call error.
    pub async fn announce(
        &self,
        mut params: AnnounceParams,
    ) -> Result<AnnounceResponse, TrackerError> {
        params.trackerid = self.trackerid.lock().clone();

        for url in &self.endpoints {
            match announce_endpoint(url, &params).await {
                Ok(response) => {
                    debug!(
                        url,
                        peers = response.peers.len(),
                        interval = response.interval,
                        "announce ok"
                    );
                    if let Some(ref id) = response.tracker_id {
                        *self.trackerid.lock() = Some(id.clone());
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(url, "tracker announce failed: {}", e);
                }
            }
        }

        Err(TrackerError::AllEndpointsFailed)
    }
}

async fn announce_endpoint(
    url: &str,
    params: &AnnounceParams,
) -> Result<AnnounceResponse, TrackerError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        HttpTracker::new(url)?.announce(params).await
    } else if url.starts_with("udp://") {
        UdpTracker::connect(url).await?.announce(params).await
    } else {
        Err(TrackerError::UnsupportedProtocol(url.to_string()))
    }
}
