//! End-to-end framing over loopback transports.

use std::time::Duration;

use wiresock::{
    FrameDecoder,
    FrameError,
    ProtocolError,
    codec::{BerDecoder, IdentityBuilder, LengthPrefixedDecoder, encode_length_prefixed},
};

mod common;

use common::{connected_pair, tcp_listener};

#[tokio::test]
async fn pipelined_frames_arrive_in_order() {
    let listener = tcp_listener().await;
    let (mut client, server) = connected_pair(&listener).await;

    let mut wire = Vec::new();
    for payload in [&b"first"[..], b"second", b"third"] {
        wire.extend_from_slice(&encode_length_prefixed(payload).expect("encode"));
    }
    client.write(&wire).await;

    let mut frames = FrameDecoder::new(server, LengthPrefixedDecoder::default(), IdentityBuilder);
    for expected in [&b"first"[..], b"second", b"third"] {
        assert_eq!(&frames.next().await.expect("frame")[..], expected);
    }
}

#[tokio::test]
async fn frames_split_across_writes_are_reassembled() {
    let listener = tcp_listener().await;
    let (mut client, server) = connected_pair(&listener).await;
    // SEQUENCE { INTEGER 5, OCTET STRING "dc=example" }
    let element: Vec<u8> = [
        &[0x30, 0x0f, 0x02, 0x01, 0x05, 0x04, 0x0a][..],
        b"dc=example",
    ]
    .concat();

    let writer = tokio::spawn(async move {
        for piece in element.chunks(3) {
            client.write(piece).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        client
    });

    let mut frames = FrameDecoder::new(server, BerDecoder::default(), IdentityBuilder);
    let message = frames.next().await.expect("element");
    assert_eq!(message.len(), 17);
    assert_eq!(&message[7..], b"dc=example");
    drop(writer.await.expect("writer task"));
}

#[tokio::test]
async fn peer_close_mid_frame_is_connection_lost() {
    let listener = tcp_listener().await;
    let (mut client, server) = connected_pair(&listener).await;
    client.write(&[0, 0, 0, 10, 1, 2]).await;
    client.close().await;

    let mut frames = FrameDecoder::new(server, LengthPrefixedDecoder::default(), IdentityBuilder);
    assert!(matches!(frames.next().await, Err(FrameError::ConnectionLost)));
}

#[tokio::test]
async fn malformed_ber_is_a_protocol_error() {
    let listener = tcp_listener().await;
    let (mut client, server) = connected_pair(&listener).await;
    client.write(&[0x30, 0x80, 0x00, 0x00]).await;

    let mut frames = FrameDecoder::new(server, BerDecoder::default(), IdentityBuilder);
    assert!(matches!(
        frames.next().await,
        Err(FrameError::Protocol(ProtocolError::Malformed(_)))
    ));
    assert!(frames.is_poisoned());
}

#[tokio::test]
async fn requests_can_be_written_through_the_decoder() {
    let listener = tcp_listener().await;
    let (client, mut server) = connected_pair(&listener).await;
    let mut frames = FrameDecoder::new(client, LengthPrefixedDecoder::default(), IdentityBuilder);

    frames
        .source_mut()
        .write(&encode_length_prefixed(b"request").expect("encode"))
        .await;
    let mut server_frames =
        FrameDecoder::new(&mut server, LengthPrefixedDecoder::default(), IdentityBuilder);
    assert_eq!(&server_frames.next().await.expect("request")[..], b"request");
}

#[tokio::test]
async fn closing_from_another_task_ends_the_frame_loop() {
    let listener = tcp_listener().await;
    let (_client, server) = connected_pair(&listener).await;
    let handle = server.close_handle();
    let mut frames = FrameDecoder::new(server, LengthPrefixedDecoder::default(), IdentityBuilder);

    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
    });
    assert!(matches!(frames.next().await, Err(FrameError::ConnectionLost)));
    closer.await.expect("closer task");
    assert!(!frames.source().is_connected());
    assert!(!frames.is_poisoned());
}
