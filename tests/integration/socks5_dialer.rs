//! SOCKS5 dialer integration tests
//!
//! The dialer is exercised against a mock SOCKS5 server that speaks just
//! enough RFC 1928/1929 to accept or reject a CONNECT, records the requested
//! target and then echoes.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use redirsocks::config::UpstreamConfig;
use redirsocks::error::DialError;
use redirsocks::io::CopyMode;
use redirsocks::upstream::{Socks5Dialer, UpstreamDialer};

use super::support::{loopback_listener, relay_with, start, TEST_DST, TEST_TIMEOUT};

// ============================================================================
// SOCKS5 Protocol Constants
// ============================================================================

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_METHOD_NONE: u8 = 0x00;
const AUTH_METHOD_PASSWORD: u8 = 0x02;
const AUTH_METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const AUTH_PASSWORD_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_CONNECTION_REFUSED: u8 = 0x05;

// ============================================================================
// Mock SOCKS5 Server
// ============================================================================

/// Configuration for mock SOCKS5 server behavior
#[derive(Clone, Default)]
struct MockServerConfig {
    /// Required username/password, if any
    credentials: Option<(String, String)>,
    /// Reply code to send after CONNECT
    reply_code: u8,
}

/// Run a mock SOCKS5 server for a single connection.
///
/// Reports the CONNECT target (if the handshake got that far) and echoes
/// afterwards when the reply was a success.
async fn run_mock_socks5_server(
    listener: TcpListener,
    config: MockServerConfig,
    target_tx: oneshot::Sender<SocketAddr>,
) {
    let Ok((mut socket, _)) = listener.accept().await else {
        return;
    };

    // Method selection: VER | NMETHODS | METHODS
    let mut header = [0u8; 2];
    if socket.read_exact(&mut header).await.is_err() || header[0] != SOCKS5_VERSION {
        return;
    }
    let mut methods = vec![0u8; header[1] as usize];
    if socket.read_exact(&mut methods).await.is_err() {
        return;
    }

    let wanted = if config.credentials.is_some() {
        AUTH_METHOD_PASSWORD
    } else {
        AUTH_METHOD_NONE
    };
    if !methods.contains(&wanted) {
        let _ = socket
            .write_all(&[SOCKS5_VERSION, AUTH_METHOD_NO_ACCEPTABLE])
            .await;
        return;
    }
    if socket.write_all(&[SOCKS5_VERSION, wanted]).await.is_err() {
        return;
    }

    if let Some((expected_user, expected_pass)) = &config.credentials {
        // VER | ULEN | USERNAME | PLEN | PASSWORD
        let mut ver_ulen = [0u8; 2];
        if socket.read_exact(&mut ver_ulen).await.is_err() {
            return;
        }
        let mut username = vec![0u8; ver_ulen[1] as usize];
        let mut plen = [0u8; 1];
        if socket.read_exact(&mut username).await.is_err()
            || socket.read_exact(&mut plen).await.is_err()
        {
            return;
        }
        let mut password = vec![0u8; plen[0] as usize];
        if socket.read_exact(&mut password).await.is_err() {
            return;
        }

        let ok = username == expected_user.as_bytes() && password == expected_pass.as_bytes();
        let status = if ok { 0x00 } else { 0x01 };
        if socket
            .write_all(&[AUTH_PASSWORD_VERSION, status])
            .await
            .is_err()
            || !ok
        {
            return;
        }
    }

    // Request: VER | CMD | RSV | ATYP | DST.ADDR | DST.PORT
    let mut request = [0u8; 4];
    if socket.read_exact(&mut request).await.is_err() || request[1] != CMD_CONNECT {
        return;
    }
    let ip: std::net::IpAddr = match request[3] {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            if socket.read_exact(&mut octets).await.is_err() {
                return;
            }
            Ipv4Addr::from(octets).into()
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            if socket.read_exact(&mut octets).await.is_err() {
                return;
            }
            Ipv6Addr::from(octets).into()
        }
        ATYP_DOMAIN => {
            // Not expected from this dialer; consume and report unspecified
            let mut len = [0u8; 1];
            if socket.read_exact(&mut len).await.is_err() {
                return;
            }
            let mut name = vec![0u8; len[0] as usize];
            if socket.read_exact(&mut name).await.is_err() {
                return;
            }
            Ipv4Addr::UNSPECIFIED.into()
        }
        _ => return,
    };
    let mut port = [0u8; 2];
    if socket.read_exact(&mut port).await.is_err() {
        return;
    }
    let _ = target_tx.send(SocketAddr::new(ip, u16::from_be_bytes(port)));

    // Reply with bound address 0.0.0.0:0
    let reply = [
        SOCKS5_VERSION,
        config.reply_code,
        0x00,
        ATYP_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ];
    if socket.write_all(&reply).await.is_err() || config.reply_code != REPLY_SUCCEEDED {
        return;
    }

    let (mut rd, mut wr) = socket.split();
    let _ = tokio::io::copy(&mut rd, &mut wr).await;
}

/// Start a one-shot mock server and a dialer pointing at it
async fn mock_and_dialer(
    config: MockServerConfig,
    relay: impl FnOnce(SocketAddr) -> String,
) -> (Socks5Dialer, oneshot::Receiver<SocketAddr>) {
    let (listener, addr) = loopback_listener().await;
    let (target_tx, target_rx) = oneshot::channel();
    tokio::spawn(run_mock_socks5_server(listener, config, target_tx));

    let dialer = Socks5Dialer::new(&UpstreamConfig {
        relay: relay(addr),
        connect_timeout_secs: 5,
    })
    .unwrap();
    (dialer, target_rx)
}

async fn assert_echo(stream: &mut TcpStream) {
    stream.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    tokio::time::timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello");
}

// ============================================================================
// Protocol Tests
// ============================================================================

#[tokio::test]
async fn test_connect_without_auth() {
    let (dialer, target_rx) =
        mock_and_dialer(MockServerConfig::default(), |addr| addr.to_string()).await;

    let target: SocketAddr = TEST_DST.parse().unwrap();
    let mut stream = dialer.dial(target).await.unwrap();

    assert_eq!(target_rx.await.unwrap(), target);
    assert_echo(&mut stream).await;
}

#[tokio::test]
async fn test_connect_ipv6_target() {
    let (dialer, target_rx) =
        mock_and_dialer(MockServerConfig::default(), |addr| addr.to_string()).await;

    let target: SocketAddr = "[2001:db8::5]:8443".parse().unwrap();
    let _stream = dialer.dial(target).await.unwrap();
    assert_eq!(target_rx.await.unwrap(), target);
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_connect_with_password() {
    let config = MockServerConfig {
        credentials: Some(("alice".into(), "s3cret".into())),
        ..MockServerConfig::default()
    };
    let (dialer, target_rx) = mock_and_dialer(config, |addr| format!("alice:s3cret@{addr}")).await;

    let mut stream = dialer.dial(TEST_DST.parse().unwrap()).await.unwrap();
    assert_eq!(target_rx.await.unwrap(), TEST_DST.parse().unwrap());
    assert_echo(&mut stream).await;
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let config = MockServerConfig {
        credentials: Some(("alice".into(), "s3cret".into())),
        ..MockServerConfig::default()
    };
    let (dialer, _target_rx) = mock_and_dialer(config, |addr| format!("alice:nope@{addr}")).await;

    let result = dialer.dial(TEST_DST.parse().unwrap()).await;
    assert!(matches!(result, Err(DialError::ConnectionFailed { .. })));
}

#[tokio::test]
async fn test_auth_required_but_not_configured() {
    let config = MockServerConfig {
        credentials: Some(("alice".into(), "s3cret".into())),
        ..MockServerConfig::default()
    };
    let (dialer, _target_rx) = mock_and_dialer(config, |addr| addr.to_string()).await;

    let result = dialer.dial(TEST_DST.parse().unwrap()).await;
    assert!(matches!(result, Err(DialError::ConnectionFailed { .. })));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_connect_refused_by_relay() {
    let config = MockServerConfig {
        reply_code: REPLY_CONNECTION_REFUSED,
        ..MockServerConfig::default()
    };
    let (dialer, target_rx) = mock_and_dialer(config, |addr| addr.to_string()).await;

    let result = dialer.dial(TEST_DST.parse().unwrap()).await;
    match result {
        Err(DialError::ConnectionFailed { target, relay, .. }) => {
            assert_eq!(target, TEST_DST.parse().unwrap());
            assert_eq!(relay, dialer.relay());
        }
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
    // The request itself reached the relay
    assert_eq!(target_rx.await.unwrap(), TEST_DST.parse().unwrap());
}

// ============================================================================
// End-to-End
// ============================================================================

#[tokio::test]
async fn test_redirector_through_socks5() {
    let (dialer, target_rx) =
        mock_and_dialer(MockServerConfig::default(), |addr| addr.to_string()).await;
    let relay = relay_with(Arc::new(dialer), CopyMode::Buffered, 16 * 1024);
    let handle = start(relay);

    let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
    client.write_all(b"PING").await.unwrap();
    let mut reply = [0u8; 4];
    tokio::time::timeout(TEST_TIMEOUT, client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    // The mock relay echoes
    assert_eq!(&reply, b"PING");
    assert_eq!(target_rx.await.unwrap(), TEST_DST.parse().unwrap());

    handle.stop();
    handle.join().await;
}
