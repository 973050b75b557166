//! Accept loop and lifecycle
//!
//! [`Redirector::start`] binds the listener and spawns the accept loop; every
//! accepted connection gets its own session task. The returned
//! [`RedirectorHandle`] stops accepting without touching active sessions.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ListenConfig;
use crate::error::RedirectError;
use crate::redirect::RedirectListener;

use super::session::Relay;
use super::stats::RelayStats;

/// Pause after an accept error caused by resource exhaustion
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts redirected connections and hands them to the relay
#[derive(Debug, Clone)]
pub struct Redirector {
    relay: Arc<Relay>,
}

impl Redirector {
    /// Create a redirector around a shared relay
    #[must_use]
    pub const fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Bind the listener and start accepting.
    ///
    /// # Errors
    ///
    /// Returns `RedirectError` if the listening socket cannot be set up.
    pub fn start(&self, config: &ListenConfig) -> Result<RedirectorHandle, RedirectError> {
        let listener = RedirectListener::bind(config)?;
        let local_addr = listener.listen_addr();

        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let stats = Arc::clone(self.relay.stats());

        let join = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.relay),
            Arc::clone(&running),
            Arc::clone(&shutdown),
        ));

        Ok(RedirectorHandle {
            running,
            shutdown,
            local_addr,
            stats,
            join,
        })
    }
}

/// Handle to a running accept loop
#[derive(Debug)]
pub struct RedirectorHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    local_addr: SocketAddr,
    stats: Arc<RelayStats>,
    join: JoinHandle<()>,
}

impl RedirectorHandle {
    /// Stop accepting new connections.
    ///
    /// The listener is closed once the accept loop observes the request.
    /// Sessions already running are not affected. Calling this twice is
    /// harmless.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("Stopping redirector on {}", self.local_addr);
        }
        // notify_one stores a permit if the loop is not parked yet
        self.shutdown.notify_one();
    }

    /// Wait for the accept loop to exit
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("Accept loop terminated abnormally: {}", e);
        }
    }

    /// Whether the accept loop is still meant to run
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get the bound listening address
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the shared statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }
}

async fn accept_loop(
    listener: RedirectListener,
    relay: Arc<Relay>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    info!("Accepting redirected connections on {}", listener.listen_addr());

    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.notified() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, client_addr)) => {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    relay.run(stream, client_addr).await;
                });
            }
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                let err = RedirectError::AcceptError(e.to_string());
                error!("{}", err);
                relay.stats().record_accept_error();
                if is_resource_exhaustion(&e) {
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    // Dropping the listener closes the socket
    debug!("Accept loop on {} exited", listener.listen_addr());
}

/// Accept errors that persist until some descriptor or memory is released
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}
