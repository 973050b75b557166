//! Relay statistics tracking
//!
//! Counters shared by the accept loop and every session. All updates are
//! relaxed atomic operations; readers get a consistent-enough view through
//! [`RelayStats::snapshot`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic relay statistics
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Sessions started
    accepted: AtomicU64,
    /// Sessions currently running
    active: AtomicU64,
    /// Sessions that reached the relaying state and finished
    completed: AtomicU64,
    /// Sessions dropped because the original destination was unknown
    resolve_failures: AtomicU64,
    /// Sessions dropped because the upstream could not be dialed
    dial_failures: AtomicU64,
    /// Sessions whose relay ended with a transport error
    transfer_errors: AtomicU64,
    /// Failed accept calls
    accept_errors: AtomicU64,
    /// Bytes client -> upstream
    bytes_up: AtomicU64,
    /// Bytes upstream -> client
    bytes_down: AtomicU64,
}

impl RelayStats {
    /// Create new relay statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session dropped at the resolving step
    pub fn record_resolve_failure(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.resolve_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session dropped at the dialing step
    pub fn record_dial_failure(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the single reported transport error of a session
    pub fn record_transfer_error(&self) {
        self.transfer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a relayed session that has closed
    pub fn record_completed(&self, bytes_up: u64, bytes_down: u64) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_up.fetch_add(bytes_up, Ordering::Relaxed);
        self.bytes_down.fetch_add(bytes_down, Ordering::Relaxed);
    }

    /// Record a failed accept
    pub fn record_accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get started sessions
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Get running sessions
    #[must_use]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Get completed sessions
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get resolve failures
    #[must_use]
    pub fn resolve_failures(&self) -> u64 {
        self.resolve_failures.load(Ordering::Relaxed)
    }

    /// Get dial failures
    #[must_use]
    pub fn dial_failures(&self) -> u64 {
        self.dial_failures.load(Ordering::Relaxed)
    }

    /// Get transfer errors
    #[must_use]
    pub fn transfer_errors(&self) -> u64 {
        self.transfer_errors.load(Ordering::Relaxed)
    }

    /// Get accept errors
    #[must_use]
    pub fn accept_errors(&self) -> u64 {
        self.accept_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all statistics
    #[must_use]
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            accepted: self.accepted(),
            active: self.active(),
            completed: self.completed(),
            resolve_failures: self.resolve_failures(),
            dial_failures: self.dial_failures(),
            transfer_errors: self.transfer_errors(),
            accept_errors: self.accept_errors(),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of relay statistics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub accepted: u64,
    pub active: u64,
    pub completed: u64,
    pub resolve_failures: u64,
    pub dial_failures: u64,
    pub transfer_errors: u64,
    pub accept_errors: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

impl RelayStatsSnapshot {
    /// Get total bytes relayed (both directions)
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_up + self.bytes_down
    }

    /// Sessions that never reached the relaying state
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.resolve_failures + self.dial_failures
    }
}

impl fmt::Display for RelayStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} active={} completed={} resolve_failures={} dial_failures={} \
             transfer_errors={} accept_errors={} bytes_up={} bytes_down={}",
            self.accepted,
            self.active,
            self.completed,
            self.resolve_failures,
            self.dial_failures,
            self.transfer_errors,
            self.accept_errors,
            self.bytes_up,
            self.bytes_down
        )
    }
}
