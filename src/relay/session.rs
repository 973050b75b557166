//! Relay session handling
//!
//! One [`Relay`] is shared by every accepted connection. [`Relay::run`] drives
//! a single session through its states:
//!
//! ```text
//! Resolving -> Dialing -> Relaying -> Closing -> Closed
//!     |           |
//!     +-----------+--> dropped (logged, counted)
//! ```
//!
//! While relaying, two copy directions run concurrently: client -> upstream
//! in a spawned task, upstream -> client in the session task itself. Each
//! direction borrows one pool buffer. Whichever direction finishes first
//! shuts down both sockets so the other unwinds, and only that first
//! direction may report an error.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, field, info, info_span, trace, warn, Instrument, Span};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::io::{BufferPool, CopyMode, CopyResult};
use crate::redirect::{DestinationResolver, OriginalDestination, RedirectedConnection};
use crate::upstream::UpstreamDialer;

use super::stats::RelayStats;

/// Default keep-alive idle time and probe interval for relayed sockets
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(20);

/// Per-session "ended" flag shared by the two copy directions
#[derive(Debug, Default)]
pub struct SessionEnd(AtomicBool);

impl SessionEnd {
    /// Create a flag for a running session
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Mark the session as ended.
    ///
    /// Returns `true` for exactly one caller: the first to finish.
    pub fn finish(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether some direction has already finished
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Looking up the original destination
    Resolving,
    /// Opening the upstream tunnel
    Dialing,
    /// Copying in both directions
    Relaying,
    /// A direction finished; tearing down
    Closing,
    /// Both sockets released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolving => write!(f, "resolving"),
            Self::Dialing => write!(f, "dialing"),
            Self::Relaying => write!(f, "relaying"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Tunables applied to every session
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Copy strategy for both directions
    pub copy_mode: CopyMode,
    /// TCP keep-alive idle time and interval
    pub keepalive: Duration,
    /// Set `TCP_NODELAY` on both sockets
    pub nodelay: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            copy_mode: CopyMode::default(),
            keepalive: DEFAULT_KEEPALIVE,
            nodelay: true,
        }
    }
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            copy_mode: config.copy_mode,
            keepalive: Duration::from_secs(config.keepalive_secs),
            nodelay: true,
        }
    }
}

/// Outcome of one session
#[derive(Debug)]
pub struct SessionReport {
    /// Client address
    pub client_addr: SocketAddr,
    /// Original destination, once resolved
    pub original_dst: Option<OriginalDestination>,
    /// State the session ended in (`Closed` after a relay, otherwise the
    /// state that failed)
    pub state: SessionState,
    /// Byte counts, if the session reached the relaying state
    pub copy: Option<CopyResult>,
    /// The single error reported for this session, if any
    pub error: Option<String>,
}

impl SessionReport {
    const fn new(client_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            original_dst: None,
            state: SessionState::Resolving,
            copy: None,
            error: None,
        }
    }

    /// Whether the session relayed and ended without a reported error
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self.state, SessionState::Closed) && self.error.is_none()
    }
}

/// What one copy direction observed
struct DirectionOutcome {
    bytes: u64,
    /// Set only if this direction finished first and failed
    error: Option<String>,
}

/// Shared session runner
pub struct Relay {
    resolver: Arc<dyn DestinationResolver>,
    dialer: Arc<dyn UpstreamDialer>,
    pool: Arc<BufferPool>,
    stats: Arc<RelayStats>,
    options: RelayOptions,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("relay", &self.dialer.relay())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Create a relay from its collaborators
    #[must_use]
    pub fn new(
        resolver: Arc<dyn DestinationResolver>,
        dialer: Arc<dyn UpstreamDialer>,
        pool: Arc<BufferPool>,
        stats: Arc<RelayStats>,
        options: RelayOptions,
    ) -> Self {
        Self {
            resolver,
            dialer,
            pool,
            stats,
            options,
        }
    }

    /// Get the shared statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Get the shared buffer pool
    #[must_use]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Get the session options
    #[must_use]
    pub const fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Run one session to completion.
    ///
    /// Never fails: every problem is logged, counted and reflected in the
    /// returned report. Both sockets are closed when this returns.
    pub async fn run(&self, stream: TcpStream, client_addr: SocketAddr) -> SessionReport {
        let span = info_span!("session", client = %client_addr, dst = field::Empty);
        self.run_session(stream, client_addr).instrument(span).await
    }

    async fn run_session(&self, stream: TcpStream, client_addr: SocketAddr) -> SessionReport {
        let mut report = SessionReport::new(client_addr);
        self.stats.record_accepted();

        // Resolving
        let conn = match RedirectedConnection::resolve(stream, client_addr, &*self.resolver) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Cannot resolve original destination of {}: {}", client_addr, e);
                self.stats.record_resolve_failure();
                report.error = Some(e.to_string());
                return report;
            }
        };
        let dst = conn.original_dst();
        Span::current().record("dst", field::display(dst));
        report.original_dst = Some(dst);

        info!("Connect to {}", dst);

        // Dialing
        report.state = SessionState::Dialing;
        debug!("Session {}", report.state);
        let upstream = match self.dialer.dial(dst.socket_addr()).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Failed to dial {} via {}: {}", dst, self.dialer.relay(), e);
                self.stats.record_dial_failure();
                report.error = Some(e.to_string());
                return report;
            }
        };

        // Relaying
        report.state = SessionState::Relaying;
        debug!("Session {} after {:?}", report.state, conn.age());
        let client = conn.into_stream();
        self.tune(&client, "client");
        self.tune(&upstream, "upstream");

        let (client_rd, client_wr) = client.into_split();
        let (upstream_rd, upstream_wr) = upstream.into_split();
        let end = Arc::new(SessionEnd::new());

        let up_task = {
            let pool = Arc::clone(&self.pool);
            let stats = Arc::clone(&self.stats);
            let end = Arc::clone(&end);
            let mode = self.options.copy_mode;
            tokio::spawn(
                async move {
                    run_direction(
                        client_rd,
                        upstream_wr,
                        "client->upstream",
                        mode,
                        &pool,
                        &end,
                        &stats,
                    )
                    .await
                }
                .in_current_span(),
            )
        };

        let down = run_direction(
            upstream_rd,
            client_wr,
            "upstream->client",
            self.options.copy_mode,
            &self.pool,
            &end,
            &self.stats,
        )
        .await;

        // Closing
        report.state = SessionState::Closing;
        trace!("Session {}", report.state);
        let up = match up_task.await {
            Ok(up) => up,
            Err(e) => {
                let err = RelayError::TaskAborted(e.to_string());
                debug!("{}", err);
                DirectionOutcome {
                    bytes: 0,
                    error: Some(err.to_string()),
                }
            }
        };

        let copy = CopyResult {
            client_to_upstream: up.bytes,
            upstream_to_client: down.bytes,
        };
        report.copy = Some(copy);
        report.error = up.error.or(down.error);
        report.state = SessionState::Closed;

        self.stats
            .record_completed(copy.client_to_upstream, copy.upstream_to_client);
        info!(
            "Connection closed: {} -> {}, {} up / {} down bytes",
            client_addr, dst, copy.client_to_upstream, copy.upstream_to_client
        );

        report
    }

    /// Apply keep-alive and `TCP_NODELAY`; failures are not fatal
    fn tune(&self, stream: &TcpStream, side: &str) {
        let sock = SockRef::from(stream);

        let keepalive = TcpKeepalive::new()
            .with_time(self.options.keepalive)
            .with_interval(self.options.keepalive);
        if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
            debug!("Failed to set keep-alive on {} socket: {}", side, e);
        }

        if self.options.nodelay {
            if let Err(e) = sock.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY on {} socket: {}", side, e);
            }
        }
    }
}

/// Copy one direction until EOF or failure, then close both sockets.
async fn run_direction<R, W>(
    mut reader: R,
    mut writer: W,
    direction: &'static str,
    mode: CopyMode,
    pool: &Arc<BufferPool>,
    end: &SessionEnd,
    stats: &RelayStats,
) -> DirectionOutcome
where
    R: AsyncRead + AsRef<TcpStream> + Unpin,
    W: AsyncWrite + AsRef<TcpStream> + Unpin,
{
    let mut buf = pool.get();
    let transfer = mode.copy(&mut reader, &mut writer, &mut buf[..]).await;
    drop(buf);

    let first = end.finish();
    let error = match transfer.error {
        Some(e) if first => {
            let err = RelayError::transfer(direction, e);
            debug!("{}", err);
            stats.record_transfer_error();
            Some(err.to_string())
        }
        Some(e) => {
            trace!("Suppressed {} error after session end: {}", direction, e);
            None
        }
        None => {
            trace!("{} reached EOF after {} bytes", direction, transfer.bytes);
            None
        }
    };

    close_both(reader.as_ref(), writer.as_ref());

    DirectionOutcome {
        bytes: transfer.bytes,
        error,
    }
}

/// Shut down both sockets so the peer direction's read returns.
fn close_both(a: &TcpStream, b: &TcpStream) {
    // ENOTCONN after the peer already went away is expected
    let _ = SockRef::from(a).shutdown(std::net::Shutdown::Both);
    let _ = SockRef::from(b).shutdown(std::net::Shutdown::Both);
}
