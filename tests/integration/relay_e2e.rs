//! End-to-end relay tests
//!
//! These tests run a real redirector on loopback with a fixed destination
//! resolver and a recording dialer pointing at a local mock upstream.
//!
//! # Test Categories
//!
//! 1. **Round trip**: request/response through the relay
//! 2. **Fidelity**: large payloads through tiny buffers, both copy modes
//! 3. **Close propagation**: either side closing tears down the session
//! 4. **Failure paths**: resolve and dial failures, single error report
//! 5. **Lifecycle**: `stop()` semantics

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use redirsocks::io::{BufferPool, CopyMode};
use redirsocks::redirect::FixedResolver;
use redirsocks::relay::{Relay, RelayOptions, RelayStats, SessionState};

use super::support::{
    loopback_listener, reaches_eof, relay_with, spawn_echo_upstream, spawn_ping_upstream, start,
    tcp_pair, wait_until, FailingDialer, FailingResolver, RecordingDialer, TEST_DST,
    TEST_TIMEOUT,
};

// ============================================================================
// Round Trip
// ============================================================================

#[tokio::test]
async fn test_ping_pong_through_relay() {
    let upstream = spawn_ping_upstream().await;
    let dialer = Arc::new(RecordingDialer::new(upstream));
    let relay = relay_with(dialer.clone(), CopyMode::Buffered, 64 * 1024);
    let handle = start(Arc::clone(&relay));

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"PING").await.unwrap();

    let mut reply = [0u8; 4];
    tokio::time::timeout(TEST_TIMEOUT, client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"PONG");

    // Dialed exactly the resolved destination
    assert_eq!(dialer.targets(), vec![TEST_DST.parse().unwrap()]);

    drop(client);
    let stats = Arc::clone(handle.stats());
    wait_until(|| stats.completed() == 1).await;

    let snap = stats.snapshot();
    assert_eq!(snap.accepted, 1);
    assert_eq!(snap.active, 0);
    assert_eq!(snap.bytes_up, 4);
    assert_eq!(snap.bytes_down, 4);

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn test_session_report_for_direct_run() {
    let upstream = spawn_ping_upstream().await;
    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        CopyMode::Manual,
        1024,
    );

    let (mut client, accepted, peer) = tcp_pair().await;
    let session = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.run(accepted, peer).await }
    });

    client.write_all(b"PING").await.unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"PONG");
    drop(client);

    let report = tokio::time::timeout(TEST_TIMEOUT, session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.client_addr, peer);
    assert_eq!(
        report.original_dst.unwrap().socket_addr(),
        TEST_DST.parse().unwrap()
    );
    assert_eq!(report.state, SessionState::Closed);
    let copy = report.copy.unwrap();
    assert_eq!(copy.client_to_upstream, 4);
    assert_eq!(copy.upstream_to_client, 4);
}

// ============================================================================
// Fidelity
// ============================================================================

async fn echo_roundtrip(copy_mode: CopyMode, buffer_size: usize, len: usize) {
    let upstream = spawn_echo_upstream().await;
    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        copy_mode,
        buffer_size,
    );
    let handle = start(relay);

    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let client = TcpStream::connect(handle.local_addr()).await.unwrap();
    let (mut rd, mut wr) = client.into_split();

    let expected = payload.clone();
    let writer = async move {
        wr.write_all(&payload).await.unwrap();
        // Keep the write half open until the echo is read back
        wr
    };
    let reader = async move {
        let mut echoed = vec![0u8; len];
        rd.read_exact(&mut echoed).await.unwrap();
        echoed
    };

    let (_wr, echoed) = tokio::time::timeout(TEST_TIMEOUT, async { tokio::join!(writer, reader) })
        .await
        .unwrap();
    assert!(echoed == expected, "echo differs ({copy_mode}, buf={buffer_size})");

    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn test_echo_fidelity_buffered_tiny_buffer() {
    echo_roundtrip(CopyMode::Buffered, 7, 100_000).await;
}

#[tokio::test]
async fn test_echo_fidelity_manual_tiny_buffer() {
    echo_roundtrip(CopyMode::Manual, 7, 100_000).await;
}

#[tokio::test]
async fn test_echo_fidelity_large_buffer() {
    echo_roundtrip(CopyMode::Buffered, 64 * 1024, 1_000_000).await;
    echo_roundtrip(CopyMode::Manual, 64 * 1024, 1_000_000).await;
}

// ============================================================================
// Close Propagation
// ============================================================================

#[tokio::test]
async fn test_client_close_reaches_upstream() {
    let (listener, upstream) = loopback_listener().await;
    let (eof_tx, eof_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        socket.read_exact(&mut buf).await.unwrap();
        socket.write_all(b"PONG").await.unwrap();
        let _ = eof_tx.send(reaches_eof(&mut socket).await);
    });

    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        CopyMode::Buffered,
        1024,
    );
    let handle = start(relay);

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"PING").await.unwrap();
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).await.unwrap();
    drop(client);

    let upstream_saw_eof = tokio::time::timeout(TEST_TIMEOUT, eof_rx)
        .await
        .unwrap()
        .unwrap();
    assert!(upstream_saw_eof);

    let stats = Arc::clone(handle.stats());
    wait_until(|| stats.completed() == 1).await;
    handle.stop();
    handle.join().await;
}

#[tokio::test]
async fn test_upstream_close_reaches_client() {
    let (listener, upstream) = loopback_listener().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"BYE").await.unwrap();
        // Dropping closes the upstream side
    });

    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        CopyMode::Buffered,
        1024,
    );
    let handle = start(relay);

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    let mut greeting = [0u8; 3];
    tokio::time::timeout(TEST_TIMEOUT, client.read_exact(&mut greeting))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&greeting, b"BYE");

    // The client never closed its side, yet the session must end
    assert!(reaches_eof(&mut client).await);

    let stats = Arc::clone(handle.stats());
    wait_until(|| stats.completed() == 1).await;
    assert_eq!(stats.active(), 0);
    handle.stop();
    handle.join().await;
}

// ============================================================================
// Failure Paths
// ============================================================================

#[tokio::test]
async fn test_resolve_failure_skips_dial() {
    let upstream = spawn_echo_upstream().await;
    let dialer = Arc::new(RecordingDialer::new(upstream));
    let stats = Arc::new(RelayStats::new());
    let relay = Relay::new(
        Arc::new(FailingResolver),
        dialer.clone(),
        Arc::new(BufferPool::new(4, 1024)),
        Arc::clone(&stats),
        RelayOptions::default(),
    );

    let (mut client, accepted, peer) = tcp_pair().await;
    let report = relay.run(accepted, peer).await;

    assert_eq!(report.state, SessionState::Resolving);
    assert!(report.original_dst.is_none());
    assert!(report.error.is_some());
    assert!(dialer.targets().is_empty());
    assert_eq!(stats.resolve_failures(), 1);
    assert_eq!(stats.active(), 0);

    // The accepted connection was dropped
    assert!(reaches_eof(&mut client).await);
}

#[tokio::test]
async fn test_dial_failure_closes_client() {
    let stats = Arc::new(RelayStats::new());
    let relay = Relay::new(
        Arc::new(FixedResolver::new(TEST_DST.parse().unwrap())),
        Arc::new(FailingDialer),
        Arc::new(BufferPool::new(4, 1024)),
        Arc::clone(&stats),
        RelayOptions::default(),
    );

    let (mut client, accepted, peer) = tcp_pair().await;
    let report = relay.run(accepted, peer).await;

    assert_eq!(report.state, SessionState::Dialing);
    assert_eq!(
        report.original_dst.unwrap().socket_addr(),
        TEST_DST.parse().unwrap()
    );
    assert!(report.error.unwrap().contains("general SOCKS server failure"));
    assert!(report.copy.is_none());
    assert_eq!(stats.dial_failures(), 1);
    assert_eq!(stats.completed(), 0);

    assert!(reaches_eof(&mut client).await);
}

#[tokio::test]
async fn test_single_error_per_session() {
    // Upstream waits for the first relayed byte, then resets
    let (listener, upstream) = loopback_listener().await;
    let (reset_tx, mut reset_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut byte = [0u8; 1];
            if socket.read_exact(&mut byte).await.is_err() {
                continue;
            }
            let _ = socket2::SockRef::from(&socket).set_linger(Some(std::time::Duration::ZERO));
            drop(socket);
            let _ = reset_tx.send(());
        }
    });

    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        CopyMode::Manual,
        1024,
    );

    for _ in 0..10 {
        let (mut client, accepted, peer) = tcp_pair().await;
        let session = tokio::spawn({
            let relay = Arc::clone(&relay);
            async move { relay.run(accepted, peer).await }
        });

        client.write_all(b"x").await.unwrap();
        tokio::time::timeout(TEST_TIMEOUT, reset_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // Reset the client too so both directions fail
        let _ = socket2::SockRef::from(&client).set_linger(Some(std::time::Duration::ZERO));
        drop(client);

        let report = tokio::time::timeout(TEST_TIMEOUT, session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.state, SessionState::Closed);
        assert!(report.error.is_some(), "reset must surface as a session error");
        assert_eq!(report.copy.unwrap().client_to_upstream, 1);
    }

    let snap = relay.stats().snapshot();
    assert_eq!(snap.completed, 10);
    assert_eq!(snap.transfer_errors, snap.completed);
    assert_eq!(snap.dial_failures, 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stop_keeps_active_sessions() {
    let upstream = spawn_echo_upstream().await;
    let relay = relay_with(
        Arc::new(RecordingDialer::new(upstream)),
        CopyMode::Buffered,
        1024,
    );
    let handle = start(relay);
    let addr = handle.local_addr();
    let stats = Arc::clone(handle.stats());

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"before").await.unwrap();
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"before");

    handle.stop();
    assert!(!handle.is_running());
    handle.stop();
    tokio::time::timeout(TEST_TIMEOUT, handle.join())
        .await
        .unwrap();

    // Stopping is not an accept fault
    assert_eq!(stats.accept_errors(), 0);

    // The listener is gone
    assert!(TcpStream::connect(addr).await.is_err());

    // The session accepted before stop still relays
    client.write_all(b"after!").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"after!");
    assert_eq!(stats.active(), 1);
}
