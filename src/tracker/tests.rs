use super::http::{parse_announce_body, percent_encode};
use super::*;
use crate::bencode::{encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::SocketAddr;

#[test]
fn test_tracker_event_encoding() {
    assert_eq!(TrackerEvent::None.as_str(), "");
    assert_eq!(TrackerEvent::Started.as_str(), "started");
    assert_eq!(TrackerEvent::Stopped.as_str(), "stopped");
    assert_eq!(TrackerEvent::Completed.as_str(), "completed");

    assert_eq!(TrackerEvent::None.as_udp_id(), 0);
    assert_eq!(TrackerEvent::Completed.as_udp_id(), 1);
    assert_eq!(TrackerEvent::Started.as_udp_id(), 2);
    assert_eq!(TrackerEvent::Stopped.as_udp_id(), 3);
}

#[test]
fn test_parse_compact_peers() {
    let blob = [
        192, 168, 1, 1, 0x1A, 0xE1, // 192.168.1.1:6881
        10, 0, 0, 7, 0x23, 0x28, // 10.0.0.7:9000
    ];
    let peers = parse_compact_peers(&blob);
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0], "192.168.1.1:6881".parse::<SocketAddr>().unwrap());
    assert_eq!(peers[1], "10.0.0.7:9000".parse::<SocketAddr>().unwrap());
}

#[test]
fn test_parse_compact_peers_ignores_trailing_bytes() {
    // 6n + k bytes: the trailing k < 6 bytes yield nothing.
    for k in 1..6 {
        let mut blob = vec![192, 168, 1, 1, 0x1A, 0xE1];
        blob.extend(std::iter::repeat(0xFFu8).take(k));
        assert_eq!(parse_compact_peers(&blob).len(), 1, "k = {}", k);
    }
    assert!(parse_compact_peers(&[1, 2, 3]).is_empty());
    assert!(parse_compact_peers(&[]).is_empty());
}

#[test]
fn test_percent_encode() {
    assert_eq!(percent_encode(b"abc-_.~123"), "abc-_.~123");
    assert_eq!(percent_encode(&[0x00, 0xFF, b' ']), "%00%FF%20");
}

#[test]
fn test_parse_announce_body_compact() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"interval"), Value::from(1800i64));
    dict.insert(Bytes::from_static(b"complete"), Value::from(10i64));
    dict.insert(Bytes::from_static(b"incomplete"), Value::from(3i64));
    dict.insert(Bytes::from_static(b"tracker id"), Value::from("tid-1"));
    dict.insert(
        Bytes::from_static(b"peers"),
        Value::Bytes(Bytes::from_static(&[127, 0, 0, 1, 0x1A, 0xE1])),
    );

    let response = parse_announce_body(&encode(&Value::Dict(dict))).unwrap();
    assert_eq!(response.interval, 1800);
    assert_eq!(response.complete, Some(10));
    assert_eq!(response.incomplete, Some(3));
    assert_eq!(response.tracker_id.as_deref(), Some("tid-1"));
    assert_eq!(response.peers, vec!["127.0.0.1:6881".parse().unwrap()]);
}

#[test]
fn test_parse_announce_body_failure_reason() {
    let mut dict = BTreeMap::new();
    dict.insert(
        Bytes::from_static(b"failure reason"),
        Value::from("unregistered torrent"),
    );
    assert!(matches!(
        parse_announce_body(&encode(&Value::Dict(dict))),
        Err(TrackerError::Failure(reason)) if reason == "unregistered torrent"
    ));
}

#[test]
fn test_parse_announce_body_missing_interval() {
    let dict: BTreeMap<Bytes, Value> = BTreeMap::new();
    assert!(matches!(
        parse_announce_body(&encode(&Value::Dict(dict))),
        Err(TrackerError::InvalidResponse(_))
    ));
}

#[test]
fn test_http_tracker_rejects_other_schemes() {
    assert!(matches!(
        HttpTracker::new("udp://tracker.example:6969"),
        Err(TrackerError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_tracker_set_empty_fails() {
    let set = TrackerSet::new(Vec::new());
    let params = AnnounceParams {
        info_hash: [0u8; 20],
        peer_id: [1u8; 20],
        port: 6881,
        uploaded: 0,
        downloaded: 0,
        left: 1000,
        event: TrackerEvent::Started,
        numwant: None,
        key: None,
        trackerid: None,
    };
    assert!(matches!(
        set.announce(params).await,
        Err(TrackerError::AllEndpointsFailed)
    ));
}

#[tokio::test]
async fn test_tracker_set_skips_unsupported_scheme() {
    let set = TrackerSet::new(vec!["wss://tracker.example/announce".into()]);
    let params = AnnounceParams {
        info_hash: [0u8; 20],
        peer_id: [1u8; 20],
        port: 6881,
        uploaded: 0,
        downloaded: 0,
        left: 1000,
        event: TrackerEvent::None,
        numwant: Some(50),
        key: Some(7),
        trackerid: None,
    };
    assert!(matches!(
        set.announce(params).await,
        Err(TrackerError::AllEndpointsFailed)
    ));
}
