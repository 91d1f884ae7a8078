use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng as _;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use super::client::AnnounceParams;
use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceResponse};

/// Connect-request magic (BEP-15).
const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;

const UDP_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ATTEMPTS: u32 = 3;

/// A UDP tracker endpoint (BEP-15).
///
/// The protocol is two round trips: a 16-byte connect request returning a
/// connection id, then a 98-byte announce request. Lost datagrams are
/// retried with a growing timeout, up to three attempts.
pub struct UdpTracker {
    socket: UdpSocket,
    connection_id: u64,
}

impl UdpTracker {
    /// Resolves `udp://host:port[/...]` and performs the connect exchange.
    pub async fn connect(url: &str) -> Result<Self, TrackerError> {
        let addr = resolve_udp_url(url).await?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        let connection_id = Self::exchange_connect(&socket).await?;
        Ok(Self {
            socket,
            connection_id,
        })
    }

    async fn exchange_connect(socket: &UdpSocket) -> Result<u64, TrackerError> {
        let transaction_id: u32 = rand::rng().random();

        let mut request = Vec::with_capacity(16);
        request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
        request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());

        let response = send_with_retry(socket, &request, 16).await?;

        let action = read_u32(&response[0..4]);
        let echoed = read_u32(&response[4..8]);
        if action != ACTION_CONNECT || echoed != transaction_id {
            return Err(TrackerError::InvalidResponse(
                "connect response mismatch".into(),
            ));
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&response[8..16]);
        Ok(u64::from_be_bytes(id))
    }

    pub async fn announce(
        &self,
        params: &AnnounceParams,
    ) -> Result<AnnounceResponse, TrackerError> {
        let transaction_id: u32 = rand::rng().random();
        let key: u32 = params.key.unwrap_or_else(|| rand::rng().random());
        let numwant: i32 = params.numwant.map(|n| n as i32).unwrap_or(-1);

        let mut request = Vec::with_capacity(98);
        request.extend_from_slice(&self.connection_id.to_be_bytes());
        request.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());
        request.extend_from_slice(&params.info_hash);
        request.extend_from_slice(&params.peer_id);
        request.extend_from_slice(&params.downloaded.to_be_bytes());
        request.extend_from_slice(&params.left.to_be_bytes());
        request.extend_from_slice(&params.uploaded.to_be_bytes());
        request.extend_from_slice(&params.event.as_udp_id().to_be_bytes());
        request.extend_from_slice(&0u32.to_be_bytes()); // IP (0 = sender's)
        request.extend_from_slice(&key.to_be_bytes());
        request.extend_from_slice(&numwant.to_be_bytes());
        request.extend_from_slice(&params.port.to_be_bytes());

        let response = send_with_retry(&self.socket, &request, 20).await?;

        let action = read_u32(&response[0..4]);
        let echoed = read_u32(&response[4..8]);

        if action == ACTION_ERROR {
            let message = String::from_utf8_lossy(&response[8..]).into_owned();
            return Err(TrackerError::Failure(message));
        }
        if action != ACTION_ANNOUNCE || echoed != transaction_id {
            return Err(TrackerError::InvalidResponse(
                "announce response mismatch".into(),
            ));
        }

        let interval = read_u32(&response[8..12]);
        let leechers = read_u32(&response[12..16]);
        let seeders = read_u32(&response[16..20]);

        let mut result = AnnounceResponse::new(interval);
        result.complete = Some(seeders);
        result.incomplete = Some(leechers);
        result.peers = parse_compact_peers(&response[20..]);
        Ok(result)
    }
}

/// Sends `request`, waiting for at least `min_len` response bytes; each
/// retry doubles the timeout.
async fn send_with_retry(
    socket: &UdpSocket,
    request: &[u8],
    min_len: usize,
) -> Result<Vec<u8>, TrackerError> {
    let mut buf = vec![0u8; 2048];

    for attempt in 0..MAX_ATTEMPTS {
        socket.send(request).await?;

        match timeout(UDP_TIMEOUT * (1 << attempt), socket.recv(&mut buf)).await {
            Ok(Ok(n)) if n >= min_len => return Ok(buf[..n].to_vec()),
            Ok(Ok(_)) => {
                return Err(TrackerError::InvalidResponse("response too short".into()));
            }
            Ok(Err(e)) => return Err(TrackerError::Io(e)),
            Err(_) => continue,
        }
    }

    Err(TrackerError::Timeout)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

async fn resolve_udp_url(url: &str) -> Result<SocketAddr, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;
    let authority = rest.split('/').next().unwrap_or(rest);

    lookup_host(authority)
        .await
        .map_err(|_| TrackerError::InvalidUrl(url.to_string()))?
        .next()
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))
}
