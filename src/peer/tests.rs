use super::*;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[test]
fn test_peer_id_prefix_and_uniqueness() {
    let a = PeerId::generate();
    let b = PeerId::generate();
    assert_ne!(a.0, b.0);
    assert!(a.0.starts_with(crate::constants::CLIENT_PREFIX.as_bytes()));
    assert!(PeerId::from_bytes(&[0u8; 19]).is_none());
}

#[test]
fn test_handshake_round_trip() {
    let handshake = Handshake::new([7u8; 20], [9u8; 20]);
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), 68);
    assert_eq!(encoded[0], 19);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, [7u8; 20]);
    assert_eq!(decoded.peer_id, [9u8; 20]);
    assert_eq!(decoded.reserved, [0u8; 8]);
}

#[test]
fn test_handshake_rejects_wrong_protocol() {
    let mut encoded = BytesMut::from(Handshake::new([0u8; 20], [0u8; 20]).encode().as_ref());
    encoded[5] ^= 0xFF;
    assert!(matches!(
        Handshake::decode(&encoded),
        Err(PeerError::HandshakeMismatch(_))
    ));
    assert!(matches!(
        Handshake::decode(&encoded[..40]),
        Err(PeerError::HandshakeMismatch(_))
    ));
}

#[test]
fn test_message_round_trips() {
    let messages = vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0xA0, 0x01])),
        Message::Request {
            index: 3,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 16384,
            data: Bytes::from_static(b"block bytes"),
        },
        Message::Cancel {
            index: 3,
            begin: 16384,
            length: 16384,
        },
    ];

    for message in messages {
        let decoded = Message::decode(message.encode()).unwrap();
        assert_eq!(decoded, message);
    }
}

#[test]
fn test_decode_rejects_unknown_tag() {
    let mut frame = BytesMut::new();
    frame.put_u32(1);
    frame.put_u8(9); // Port: outside this engine's protocol
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));
}

#[test]
fn test_decode_rejects_wrong_payload_shapes() {
    // Have with a short payload.
    let mut frame = BytesMut::new();
    frame.put_u32(3);
    frame.put_u8(4);
    frame.put_u16(1);
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));

    // Request with a long payload.
    let mut frame = BytesMut::new();
    frame.put_u32(14);
    frame.put_u8(6);
    frame.put_slice(&[0u8; 13]);
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));

    // Choke with a payload.
    let mut frame = BytesMut::new();
    frame.put_u32(2);
    frame.put_u8(0);
    frame.put_u8(0);
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));

    // Piece without index/offset.
    let mut frame = BytesMut::new();
    frame.put_u32(5);
    frame.put_u8(7);
    frame.put_u32(0);
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));
}

#[test]
fn test_decode_rejects_oversized_frame() {
    let mut frame = BytesMut::new();
    frame.put_u32(crate::constants::MAX_FRAME as u32 + 1);
    assert!(matches!(
        Message::decode(frame.freeze()),
        Err(PeerError::MalformedFrame(_))
    ));
}

#[test]
fn test_bitfield_msb_first_mapping() {
    // peer_has_piece(i) == (bits[i/8] >> (7 - i%8)) & 1
    let raw = [0b1010_0000u8, 0b0000_0001];
    let bf = Bitfield::from_bytes(Bytes::copy_from_slice(&raw), 16);

    for i in 0..16 {
        let expected = (raw[i / 8] >> (7 - i % 8)) & 1 == 1;
        assert_eq!(bf.has(i), expected, "piece {}", i);
    }
    assert!(bf.has(0));
    assert!(!bf.has(1));
    assert!(bf.has(2));
    assert!(bf.has(15));
    assert_eq!(bf.count(), 3);
    assert_eq!(bf.ones().collect::<Vec<_>>(), vec![0, 2, 15]);
}

#[test]
fn test_bitfield_masks_spare_bits() {
    // 10 pieces in 2 bytes: the low 6 bits of byte 1 are spare.
    let bf = Bitfield::from_bytes(Bytes::from_static(&[0xFF, 0xFF]), 10);
    assert_eq!(bf.count(), 10);
    assert!(!bf.has(10));
    assert!(!bf.has(200));

    let mut bf = Bitfield::new(10);
    bf.set(9);
    bf.set(10); // out of range, ignored
    assert_eq!(bf.count(), 1);
    assert_eq!(bf.as_bytes(), &[0x00, 0x40]);
}

#[test]
fn test_bitfield_short_payload_padded() {
    let bf = Bitfield::from_bytes(Bytes::from_static(&[0x80]), 16);
    assert!(bf.has(0));
    assert!(!bf.has(8));
    assert_eq!(bf.piece_count(), 16);
}

async fn transport_pair() -> (PeerTransport, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (
        PeerTransport::new(client, Duration::from_secs(2)),
        server,
    )
}

#[tokio::test]
async fn test_transport_reassembles_split_frames() {
    let (mut transport, mut server) = transport_pair().await;

    let frame = Message::Piece {
        index: 1,
        begin: 0,
        data: Bytes::from(vec![0x5A; 1000]),
    }
    .encode();

    // Deliver the frame in three slices with pauses between them.
    let server_task = tokio::spawn(async move {
        for chunk in frame.chunks(400) {
            server.write_all(chunk).await.unwrap();
            server.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        server
    });

    let message = transport.receive_message().await.unwrap();
    assert!(matches!(
        message,
        Message::Piece { index: 1, begin: 0, ref data } if data.len() == 1000
    ));
    drop(server_task.await.unwrap());
}

#[tokio::test]
async fn test_transport_reads_back_to_back_frames_exactly() {
    let (mut transport, mut server) = transport_pair().await;

    let mut wire = BytesMut::new();
    wire.put_slice(&Message::Unchoke.encode());
    wire.put_slice(&Message::Have { piece: 3 }.encode());
    wire.put_slice(&Message::KeepAlive.encode());
    server.write_all(&wire).await.unwrap();

    assert_eq!(transport.receive_message().await.unwrap(), Message::Unchoke);
    assert_eq!(
        transport.receive_message().await.unwrap(),
        Message::Have { piece: 3 }
    );
    assert_eq!(
        transport.receive_message().await.unwrap(),
        Message::KeepAlive
    );
}

#[tokio::test]
async fn test_transport_timeout_preserves_partial_frame() {
    let (mut transport, mut server) = transport_pair().await;

    let frame = Message::Have { piece: 9 }.encode();
    server.write_all(&frame[..3]).await.unwrap();
    server.flush().await.unwrap();

    assert!(matches!(
        transport.receive_message().await,
        Err(PeerError::Timeout)
    ));

    // The remainder arrives later; the frame is still whole.
    server.write_all(&frame[3..]).await.unwrap();
    assert_eq!(
        transport.receive_message().await.unwrap(),
        Message::Have { piece: 9 }
    );
}

#[tokio::test]
async fn test_transport_close_mid_frame_is_malformed() {
    let (mut transport, mut server) = transport_pair().await;

    let frame = Message::Have { piece: 9 }.encode();
    server.write_all(&frame[..5]).await.unwrap();
    server.flush().await.unwrap();
    drop(server);

    assert!(matches!(
        transport.receive_message().await,
        Err(PeerError::MalformedFrame(_))
    ));
}

#[tokio::test]
async fn test_transport_clean_close_between_frames() {
    let (mut transport, mut server) = transport_pair().await;

    server.write_all(&Message::Choke.encode()).await.unwrap();
    server.flush().await.unwrap();
    drop(server);

    assert_eq!(transport.receive_message().await.unwrap(), Message::Choke);
    assert!(matches!(
        transport.receive_message().await,
        Err(PeerError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_transport_oversized_frame_rejected_before_payload() {
    let (mut transport, mut server) = transport_pair().await;

    let mut prefix = BytesMut::new();
    prefix.put_u32(crate::constants::MAX_FRAME as u32 + 100);
    server.write_all(&prefix).await.unwrap();

    assert!(matches!(
        transport.receive_message().await,
        Err(PeerError::MalformedFrame(_))
    ));
}

#[tokio::test]
async fn test_handshake_over_socket() {
    let (mut transport, mut server) = transport_pair().await;

    let ours = Handshake::new([3u8; 20], [4u8; 20]);
    transport.send_handshake(&ours).await.unwrap();

    let mut buf = vec![0u8; 68];
    tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf)
        .await
        .unwrap();
    let received = Handshake::decode(&buf).unwrap();
    assert_eq!(received.info_hash, [3u8; 20]);

    server
        .write_all(&Handshake::new([3u8; 20], [5u8; 20]).encode())
        .await
        .unwrap();
    let theirs = transport.receive_handshake().await.unwrap();
    assert_eq!(theirs.peer_id, [5u8; 20]);
}
