use std::fmt::Write as _;
use std::time::Duration;

use reqwest::Client;

use super::client::AnnounceParams;
use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceResponse};
use crate::bencode::decode;
use crate::constants::USER_AGENT;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP(S) tracker endpoint (BEP-3).
///
/// Announces are GET requests with query-string parameters; the response
/// is a bencoded dictionary carrying the interval and a compact peer
/// blob.
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn announce(
        &self,
        params: &AnnounceParams,
    ) -> Result<AnnounceResponse, TrackerError> {
        let url = self.build_url(params);
        let body = self.client.get(&url).send().await?.bytes().await?;
        parse_announce_body(&body)
    }

    fn build_url(&self, params: &AnnounceParams) -> String {
        let mut url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            percent_encode(&params.info_hash),
            percent_encode(&params.peer_id),
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
        );

        let event = params.event.as_str();
        if !event.is_empty() {
            let _ = write!(url, "&event={}", event);
        }
        if let Some(numwant) = params.numwant {
            let _ = write!(url, "&numwant={}", numwant);
        }
        if let Some(key) = params.key {
            let _ = write!(url, "&key={}", key);
        }
        if let Some(ref trackerid) = params.trackerid {
            let _ = write!(url, "&trackerid={}", percent_encode(trackerid.as_bytes()));
        }

        url
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub(super) fn parse_announce_body(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let value = decode(body)?;
    if value.as_dict().is_none() {
        return Err(TrackerError::InvalidResponse("expected dict".into()));
    }

    if let Some(reason) = value.get(b"failure reason").and_then(|v| v.as_str()) {
        return Err(TrackerError::Failure(reason.to_string()));
    }

    let interval = value
        .get(b"interval")
        .and_then(|v| v.as_integer())
        .ok_or_else(|| TrackerError::InvalidResponse("missing interval".into()))?
        as u32;

    let mut response = AnnounceResponse::new(interval);

    response.min_interval = value
        .get(b"min interval")
        .and_then(|v| v.as_integer())
        .map(|n| n as u32);
    response.complete = value
        .get(b"complete")
        .and_then(|v| v.as_integer())
        .map(|n| n as u32);
    response.incomplete = value
        .get(b"incomplete")
        .and_then(|v| v.as_integer())
        .map(|n| n as u32);
    response.warning_message = value
        .get(b"warning message")
        .and_then(|v| v.as_str())
        .map(String::from);
    response.tracker_id = value
        .get(b"tracker id")
        .and_then(|v| v.as_str())
        .map(String::from);

    if let Some(peers) = value.get(b"peers") {
        if let Some(blob) = peers.as_bytes() {
            response.peers = parse_compact_peers(blob);
        } else if let Some(list) = peers.as_list() {
            // Non-compact dict-model fallback some trackers still send.
            for peer in list {
                let ip = peer
                    .get(b"ip")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok());
                let port = peer
                    .get(b"port")
                    .and_then(|v| v.as_integer())
                    .map(|p| p as u16);
                if let (Some(ip), Some(port)) = (ip, port) {
                    response.peers.push(std::net::SocketAddr::new(ip, port));
                }
            }
        }
    }

    Ok(response)
}

/// Percent-encodes raw bytes for announce query parameters.
pub(super) fn percent_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut out, &b| {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
        out
    })
}
