//! Integration tests — OPC frames over a real TCP connection on localhost,
//! through the stream decoder and router into per-output slots, plus the
//! full pixel path from wire bytes to serial frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use pixelport_core::protocol::{adalight, awa};
use pixelport_core::{
    serve_connection, transform, Frame, OutputConfig, OutputStats, PixelFormat, Protocol, Router,
    ServerStats, Slot, Target,
};

// ── Helpers ──────────────────────────────────────────────────────

fn output(port: &str, channel: u8, led_count: usize, offset: usize) -> OutputConfig {
    OutputConfig {
        port: port.into(),
        protocol: Protocol::Adalight,
        hardware_type: None,
        baud_rate: 115_200,
        handshake_baud_rate: None,
        led_count,
        opc_channel: channel,
        opc_offset: offset,
        pixel_format: None,
    }
}

struct Bridge {
    router: Arc<Router>,
    slots: Vec<Arc<Slot>>,
    stats: Vec<Arc<OutputStats>>,
}

fn bridge(outputs: &[OutputConfig]) -> Bridge {
    let mut targets = Vec::new();
    let mut slots = Vec::new();
    let mut stats = Vec::new();
    for config in outputs {
        let slot = Arc::new(Slot::new());
        let stat = Arc::new(OutputStats::default());
        targets.push(Target::new(config, Arc::clone(&slot), Arc::clone(&stat)));
        slots.push(slot);
        stats.push(stat);
    }
    Bridge {
        router: Arc::new(Router::new(targets, Arc::new(ServerStats::default()))),
        slots,
        stats,
    }
}

/// Spin up a listener on an OS-assigned port feeding `router`; every
/// accepted connection gets its own framer task.
async fn spawn_listener(router: Arc<Router>, token: CancellationToken) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let Ok((stream, _)) = accepted else { break };
            tokio::spawn(serve_connection(
                stream,
                Arc::clone(&router),
                token.clone(),
            ));
        }
    });
    addr
}

/// OPC wire bytes for one set-pixels message.
fn opc_frame(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut wire = vec![channel, 0x00];
    wire.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    wire.extend_from_slice(payload);
    wire
}

/// Poll until `predicate` holds or two seconds pass.
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

async fn take_frame(slot: &Arc<Slot>) -> Frame {
    wait_until(|| slot.depth() == 1).await;
    slot.try_take().unwrap()
}

// ── Framing over TCP ─────────────────────────────────────────────

#[tokio::test]
async fn frames_route_over_tcp() {
    let bx = bridge(&[output("o1", 1, 2, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&opc_frame(1, &[0xFF, 0, 0, 0, 0xFF, 0]))
        .await
        .unwrap();

    let frame = take_frame(&bx.slots[0]).await;
    assert_eq!(frame.pixels, vec![0xFF, 0, 0, 0, 0xFF, 0]);
    token.cancel();
}

#[tokio::test]
async fn split_writes_reassemble() {
    let bx = bridge(&[output("o1", 1, 2, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let wire = opc_frame(1, &[1, 2, 3, 4, 5, 6]);
    let mut client = TcpStream::connect(addr).await.unwrap();

    // Header first, payload later: the framer must wait for the rest.
    client.write_all(&wire[..4]).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bx.slots[0].depth(), 0);

    client.write_all(&wire[4..]).await.unwrap();
    let frame = take_frame(&bx.slots[0]).await;
    assert_eq!(frame.pixels, vec![1, 2, 3, 4, 5, 6]);
    token.cancel();
}

#[tokio::test]
async fn burst_collapses_to_newest() {
    let bx = bridge(&[output("o1", 1, 1, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    // Ten frames in one TCP write; no worker consumes in between.
    let mut wire = Vec::new();
    for i in 0..10u8 {
        wire.extend_from_slice(&opc_frame(1, &[i, i, i]));
    }
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    wait_until(|| bx.stats[0].snapshot().frames_received == 10).await;
    assert_eq!(bx.stats[0].snapshot().dropped_replaced, 9);
    assert_eq!(bx.slots[0].try_take().unwrap().pixels, vec![9, 9, 9]);
    token.cancel();
}

#[tokio::test]
async fn broadcast_reaches_everyone_and_supersedes() {
    let bx = bridge(&[output("o1", 1, 2, 0), output("o2", 0, 2, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();

    // Channel 1: only o1.
    client
        .write_all(&opc_frame(1, &[1, 1, 1, 1, 1, 1]))
        .await
        .unwrap();
    wait_until(|| bx.stats[0].snapshot().frames_received == 1).await;
    assert_eq!(bx.slots[1].depth(), 0);

    // Channel 0: both outputs; o1's pending frame is replaced.
    client
        .write_all(&opc_frame(0, &[2, 2, 2, 2, 2, 2]))
        .await
        .unwrap();
    wait_until(|| bx.stats[1].snapshot().frames_received == 1).await;

    assert_eq!(bx.slots[0].try_take().unwrap().pixels, vec![2, 2, 2, 2, 2, 2]);
    assert_eq!(bx.slots[1].try_take().unwrap().pixels, vec![2, 2, 2, 2, 2, 2]);
    assert_eq!(bx.stats[0].snapshot().dropped_replaced, 1);
    token.cancel();
}

#[tokio::test]
async fn unknown_commands_are_discarded() {
    let bx = bridge(&[output("o1", 0, 1, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let mut wire = vec![0u8, 0xFF, 0, 3, 1, 2, 3]; // command 0xFF
    wire.extend_from_slice(&opc_frame(0, &[7, 8, 9])); // then a real frame
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&wire).await.unwrap();

    let frame = take_frame(&bx.slots[0]).await;
    assert_eq!(frame.pixels, vec![7, 8, 9]);
    let (received, unknown) = bx.router.server_stats().snapshot();
    assert_eq!(received, 1);
    assert_eq!(unknown, 1);
    token.cancel();
}

#[tokio::test]
async fn connections_are_independent() {
    let bx = bridge(&[output("o1", 1, 1, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let mut a = TcpStream::connect(addr).await.unwrap();
    let mut b = TcpStream::connect(addr).await.unwrap();

    a.write_all(&opc_frame(1, &[1, 1, 1])).await.unwrap();
    wait_until(|| bx.stats[0].snapshot().frames_received == 1).await;

    // First client drops; the second keeps feeding the same router.
    drop(a);
    b.write_all(&opc_frame(1, &[2, 2, 2])).await.unwrap();
    wait_until(|| bx.stats[0].snapshot().frames_received == 2).await;
    assert_eq!(bx.slots[0].try_take().unwrap().pixels, vec![2, 2, 2]);
    token.cancel();
}

// ── Wire-to-serial pixel paths ───────────────────────────────────

#[tokio::test]
async fn awa_output_end_to_end() {
    // Two LEDs, passthrough, AWA: OPC bytes FF 00 00 00 FF 00.
    let bx = bridge(&[output("awa0", 0, 2, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let payload = [0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00];
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&opc_frame(0, &payload)).await.unwrap();

    let frame = take_frame(&bx.slots[0]).await;
    let wire = transform(frame.pixels, PixelFormat::Passthrough);
    let serial = awa::encode_frame(&wire, 3);

    assert_eq!(&serial[..3], &[0x41, 0x77, 0x61]);
    assert_eq!(&serial[3..5], &[0x00, 0x01]); // two LEDs → count field 1
    assert_eq!(serial[5], 0x00 ^ 0x01 ^ 0x55);
    assert_eq!(&serial[6..12], &payload);
    assert_eq!(serial.len(), 6 + 6 + 3); // header + payload + trailer
    token.cancel();
}

#[test]
fn grb_adalight_end_to_end() {
    // One LED, GRB, AdaLight: payload AA BB CC → 41 64 61 00 00 55 BB AA CC.
    let wire = transform(vec![0xAA, 0xBB, 0xCC], PixelFormat::Grb);
    let serial = adalight::encode_frame(&wire, PixelFormat::Grb.stride());
    assert_eq!(
        serial,
        vec![0x41, 0x64, 0x61, 0x00, 0x00, 0x55, 0xBB, 0xAA, 0xCC]
    );
}

#[test]
fn rgbw_adalight_end_to_end() {
    // One LED, RGBW, AdaLight: payload 10 20 30 → W = 10.
    let wire = transform(vec![0x10, 0x20, 0x30], PixelFormat::Rgbw);
    let serial = adalight::encode_frame(&wire, PixelFormat::Rgbw.stride());
    assert_eq!(&serial[..6], &[0x41, 0x64, 0x61, 0x00, 0x00, 0x55]);
    assert_eq!(&serial[6..], &[0x10, 0x20, 0x30, 0x10]);
}

#[test]
fn serial_frame_byte_counts_are_exact() {
    for led_count in [1usize, 64, 256, 257] {
        let pixels = vec![0u8; led_count * 3];
        assert_eq!(
            adalight::encode_frame(&pixels, 3).len(),
            6 + led_count * 3
        );
        assert_eq!(awa::encode_frame(&pixels, 3).len(), 6 + led_count * 3 + 3);

        let expanded = transform(pixels, PixelFormat::Rgbw);
        assert_eq!(
            adalight::encode_frame(&expanded, 4).len(),
            6 + led_count * 4
        );
    }
}

#[tokio::test]
async fn shutdown_token_ends_connections() {
    let bx = bridge(&[output("o1", 1, 1, 0)]);
    let token = CancellationToken::new();
    let addr = spawn_listener(Arc::clone(&bx.router), token.clone()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&opc_frame(1, &[5, 5, 5])).await.unwrap();
    wait_until(|| bx.stats[0].snapshot().frames_received == 1).await;

    token.cancel();
    // Frames written after shutdown go nowhere.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = client.write_all(&opc_frame(1, &[6, 6, 6])).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bx.stats[0].snapshot().frames_received, 1);
}
