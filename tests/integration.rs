//! Integration tests for fractalwire.
//!
//! These tests verify the integration between the protocol and connection
//! modules.

use bytes::Bytes;
use fractalwire::arena::Arena;
use fractalwire::connection::{
    event_channel, Connection, ConnectionConfig, ConnectionOutput, ConnectionState,
    DisconnectReason,
};
use fractalwire::protocol::{
    build_frame, chunk_count, chunk_pixels, FrameBuffer, ResponseChunk, TileRequest,
    MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MAX_PIXEL_CHUNK,
};
use fractalwire::{Complex, Error};
use tokio::io::{duplex, AsyncWriteExt};

fn request() -> TileRequest {
    TileRequest {
        min: Complex::new(-0.75, 0.1),
        max: Complex::new(-0.5, 0.35),
        width: 640,
        height: 480,
        max_iter: 1000,
    }
}

/// A request survives framing and deframing byte by byte.
#[test]
fn test_request_through_frame_buffer() {
    let frame = build_frame(&request().encode()).unwrap();
    let mut buffer = FrameBuffer::new();

    let mut payloads = Vec::new();
    for byte in &frame {
        payloads.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
    }

    assert_eq!(payloads.len(), 1);
    assert_eq!(TileRequest::decode(&payloads[0]).unwrap(), request());
}

/// A tile split into chunks and framed reassembles to the original pixels.
#[test]
fn test_chunked_tile_through_frame_buffer() {
    let pixels: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let chunks = chunk_pixels(Bytes::from(pixels.clone())).unwrap();
    assert_eq!(chunks.len(), chunk_count(pixels.len()));

    let mut wire = Vec::new();
    for chunk in &chunks {
        wire.extend(build_frame(&chunk.encode()).unwrap());
    }

    let mut buffer = FrameBuffer::new();
    let mut reassembled = Vec::new();
    let mut lasts = Vec::new();
    for piece in wire.chunks(7919) {
        for payload in buffer.push(piece).unwrap() {
            let chunk = ResponseChunk::decode(&payload).unwrap();
            reassembled.extend_from_slice(chunk.pixels());
            lasts.push(chunk.is_last());
        }
    }

    assert_eq!(reassembled, pixels);
    assert_eq!(lasts, vec![false, false, false, true]);
}

/// A full-size chunk frame stays within the frame limit.
#[test]
fn test_max_chunk_fits_in_frame() {
    let chunk = ResponseChunk::new(Bytes::from(vec![1; MAX_PIXEL_CHUNK]), true).unwrap();
    let frame = build_frame(&chunk.encode()).unwrap();
    assert!(frame.len() <= MAX_FRAME_SIZE);

    let largest = build_frame(&vec![0; MAX_PAYLOAD_SIZE]).unwrap();
    assert_eq!(largest.len(), MAX_FRAME_SIZE);
    assert!(build_frame(&vec![0; MAX_PAYLOAD_SIZE + 1]).is_err());
}

/// A 40000-pixel claim is a framing error, whatever follows it.
#[test]
fn test_oversized_pixel_count_rejected() {
    let mut payload = 40000u16.to_le_bytes().to_vec();
    payload.extend(vec![0; 40001]);
    let result = ResponseChunk::decode(&Bytes::from(payload));
    assert!(matches!(result, Err(Error::Framing(_))));
}

/// Two connections over one duplex pipe exchange a request and chunks, then
/// both observe exactly one disconnect.
#[tokio::test]
async fn test_connections_exchange_and_disconnect() {
    let (near, far) = duplex(256 * 1024);
    let mut keys = Arena::new();
    let (client_tx, mut client_rx) = event_channel();
    let (server_tx, mut server_rx) = event_channel();
    let config = ConnectionConfig::default();
    let mut client = Connection::new(keys.insert(()), "server", near, &config, client_tx);
    let mut server = Connection::new(keys.insert(()), "client", far, &config, server_tx);

    server.read().unwrap();
    client.write(request().encode()).unwrap();
    client.read().unwrap();

    let received = match server.complete(server_rx.recv().await.unwrap()) {
        ConnectionOutput::Message(payload) => TileRequest::decode(&payload).unwrap(),
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(received, request());

    let chunk = ResponseChunk::new(Bytes::from_static(&[1, 2, 3]), true).unwrap();
    server.write(chunk.encode()).unwrap();

    // The client sees its own write completion and the response, in either order.
    let mut got_response = false;
    let mut got_written = false;
    while !(got_response && got_written) {
        match client.complete(client_rx.recv().await.unwrap()) {
            ConnectionOutput::Message(payload) => {
                assert_eq!(ResponseChunk::decode(&payload).unwrap(), chunk);
                got_response = true;
            }
            ConnectionOutput::Written => got_written = true,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(client.state(), ConnectionState::Idle);

    // Server hangs up after its write completes.
    assert!(matches!(
        server.complete(server_rx.recv().await.unwrap()),
        ConnectionOutput::Written
    ));
    server.close();
    assert!(matches!(
        server.complete(server_rx.recv().await.unwrap()),
        ConnectionOutput::Disconnected(DisconnectReason::Local)
    ));

    client.read().unwrap();
    assert!(matches!(
        client.complete(client_rx.recv().await.unwrap()),
        ConnectionOutput::Disconnected(DisconnectReason::EndOfStream)
    ));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client_rx.try_recv().is_err());
    assert!(server_rx.try_recv().is_err());
}

/// Bytes trickling in one at a time still produce one message.
#[tokio::test]
async fn test_connection_reassembles_trickled_frame() {
    let (near, mut far) = duplex(16);
    let mut keys = Arena::new();
    let (tx, mut rx) = event_channel();
    let mut conn = Connection::new(keys.insert(()), "peer", near, &ConnectionConfig::default(), tx);

    conn.read().unwrap();
    let frame = build_frame(&request().encode()).unwrap();
    tokio::spawn(async move {
        for byte in frame {
            far.write_all(&[byte]).await.unwrap();
            tokio::task::yield_now().await;
        }
        // Keep the stream open until the reader is done.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    });

    match conn.complete(rx.recv().await.unwrap()) {
        ConnectionOutput::Message(payload) => {
            assert_eq!(TileRequest::decode(&payload).unwrap(), request());
        }
        other => panic!("unexpected {:?}", other),
    }
}
